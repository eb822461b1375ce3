//! Image archive fixtures built on the fly for integration tests
#![allow(dead_code)]

use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::{json, Value};
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tar_rs as tar;

pub const TOOL_SCRIPT: &[u8] = b"#!/bin/sh\necho tool\n";
pub const LIBTOOL_BYTES: &[u8] = b"\x7fELF not really a library";

#[derive(Debug, Clone)]
pub enum Node {
    Dir(&'static str),
    File(&'static str, &'static [u8]),
    Symlink(&'static str, &'static str),
}

#[derive(Debug, Clone)]
pub struct FixtureLayer {
    pub id: &'static str,
    pub nodes: Vec<Node>,
    /// Left out of the outer archive even though the manifest lists it.
    pub omitted: bool,
}

impl FixtureLayer {
    pub fn new(id: &'static str, nodes: Vec<Node>) -> Self {
        Self {
            id,
            nodes,
            omitted: false,
        }
    }

    pub fn tarball(&self) -> String {
        format!("{}/layer.tar", self.id)
    }
}

#[derive(Debug, Clone)]
pub struct ImageFixture {
    pub layers: Vec<FixtureLayer>,
    pub history: Vec<Value>,
    pub repo_tags: Option<Vec<String>>,
    /// Gzip every nested layer tarball.
    pub gzip_layers: bool,
}

impl ImageFixture {
    /// Three layers:
    /// - 0 (`aaa`): `etc`, `usr/bin` with a script and a symlink to it, `usrlocal`, two
    ///   root files stored out of alphabetical order
    /// - 1 (`bbb`): empty filesystem
    /// - 2 (`ccc`): `usr/lib/libtool.so` and `opt/app/config.json`
    ///
    /// The config history has an `empty_layer` entry between the first two layers.
    pub fn sample() -> Self {
        let aaa = FixtureLayer::new(
            "aaa",
            vec![
                Node::Dir("etc/"),
                Node::File("etc/hosts", b"127.0.0.1 localhost\n"),
                Node::Dir("usr/"),
                Node::Dir("usr/bin/"),
                Node::File("usr/bin/tool", TOOL_SCRIPT),
                Node::Symlink("usr/bin/tool-link", "tool"),
                Node::Dir("usrlocal/"),
                Node::File("usrlocal/README", b"not under usr\n"),
                Node::File("zeta.txt", b"zeta\n"),
                Node::File("Alpha.txt", b"alpha\n"),
            ],
        );
        let bbb = FixtureLayer::new("bbb", Vec::new());
        let ccc = FixtureLayer::new(
            "ccc",
            vec![
                Node::Dir("usr/"),
                Node::Dir("usr/lib/"),
                Node::File("usr/lib/libtool.so", LIBTOOL_BYTES),
                Node::Dir("opt/"),
                Node::Dir("opt/app/"),
                Node::File("opt/app/config.json", b"{\"debug\": false}\n"),
            ],
        );

        Self {
            layers: vec![aaa, bbb, ccc],
            history: vec![
                json!({
                    "created": "2024-01-02T03:04:05Z",
                    "created_by": "/bin/sh -c #(nop) ADD file:1234 in / "
                }),
                json!({
                    "created": "2024-01-02T03:04:06Z",
                    "created_by": "/bin/sh -c #(nop)  ENV PATH=/usr/bin",
                    "empty_layer": true
                }),
                json!({
                    "created": "2024-01-02T03:04:07Z",
                    "created_by": "/bin/sh -c true"
                }),
                json!({
                    "created": "2024-01-02T03:04:08Z",
                    "created_by": "/bin/sh -c install-app"
                }),
            ],
            repo_tags: Some(vec!["sample:latest".to_string()]),
            gzip_layers: false,
        }
    }

    pub fn config(&self) -> Value {
        json!({
            "architecture": "amd64",
            "os": "linux",
            "created": "2024-01-02T03:04:08Z",
            "rootfs": {
                "type": "layers",
                "diff_ids": self
                    .layers
                    .iter()
                    .map(|layer| format!("sha256:{}", layer.id))
                    .collect::<Vec<_>>(),
            },
            "history": self.history,
        })
    }

    pub fn manifest(&self) -> Value {
        let mut entry = json!({
            "Config": "config.json",
            "Layers": self.layers.iter().map(FixtureLayer::tarball).collect::<Vec<_>>(),
        });
        if let Some(tags) = &self.repo_tags {
            entry["RepoTags"] = json!(tags);
        }
        json!([entry])
    }

    /// Writes the image archive to `dir/name`; a `.tar.gz`/`.tgz` name gets a gzip
    /// compressed archive.
    pub fn write(&self, dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        let file = File::create(&path).expect("Failed to create fixture archive");

        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            let encoder = GzEncoder::new(file, Compression::default());
            let encoder = self.append_members(encoder);
            encoder.finish().expect("Failed to finish gzip stream");
        } else {
            self.append_members(file);
        }
        path
    }

    fn append_members<W: Write>(&self, writer: W) -> W {
        let mut builder = tar::Builder::new(writer);

        append_file(
            &mut builder,
            "manifest.json",
            &serde_json::to_vec(&self.manifest()).expect("Failed to encode manifest"),
        );
        append_file(
            &mut builder,
            "config.json",
            &serde_json::to_vec(&self.config()).expect("Failed to encode config"),
        );

        for layer in self.layers.iter().filter(|layer| !layer.omitted) {
            append_dir(&mut builder, &format!("{}/", layer.id));
            let mut bytes = nested_tar(&layer.nodes);
            if self.gzip_layers {
                bytes = gzip(&bytes);
            }
            append_file(&mut builder, &layer.tarball(), &bytes);
        }

        builder.into_inner().expect("Failed to finish fixture archive")
    }
}

/// Tar bytes for a layer filesystem.
pub fn nested_tar(nodes: &[Node]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for node in nodes {
        match node {
            Node::Dir(path) => append_dir(&mut builder, path),
            Node::File(path, bytes) => append_file(&mut builder, path, bytes),
            Node::Symlink(path, target) => {
                let mut header = tar::Header::new_gnu();
                header.set_entry_type(tar::EntryType::Symlink);
                header.set_size(0);
                header.set_mode(0o777);
                builder
                    .append_link(&mut header, path, target)
                    .expect("Failed to append symlink");
            }
        }
    }
    builder.into_inner().expect("Failed to finish layer tar")
}

pub fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).expect("Failed to gzip");
    encoder.finish().expect("Failed to finish gzip stream")
}

fn append_file<W: Write>(builder: &mut tar::Builder<W>, path: &str, bytes: &[u8]) {
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(tar::EntryType::Regular);
    header.set_size(bytes.len() as u64);
    header.set_mode(0o644);
    builder
        .append_data(&mut header, path, bytes)
        .expect("Failed to append file");
}

fn append_dir<W: Write>(builder: &mut tar::Builder<W>, path: &str) {
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(tar::EntryType::Directory);
    header.set_size(0);
    header.set_mode(0o755);
    builder
        .append_data(&mut header, path, io::empty())
        .expect("Failed to append directory");
}
