//! Selection movement for fixed-height lists. Only the offset is ever adjusted to keep
//! `offset <= selected < offset + viewport`.

pub(super) fn up(selected: &mut usize, offset: &mut usize, viewport: usize) {
    *selected = selected.saturating_sub(1);
    *offset = reveal(*selected, *offset, viewport);
}

pub(super) fn down(selected: &mut usize, offset: &mut usize, len: usize, viewport: usize) {
    if *selected + 1 < len {
        *selected += 1;
    }
    *offset = reveal(*selected, *offset, viewport);
}

/// Smallest change to `offset` that makes `selected` visible.
pub(super) fn reveal(selected: usize, offset: usize, viewport: usize) -> usize {
    let viewport = viewport.max(1);
    if selected < offset {
        selected
    } else if selected >= offset + viewport {
        selected + 1 - viewport
    } else {
        offset
    }
}

/// Offset that puts `selected` in the middle of the viewport.
pub(super) fn centered(selected: usize, viewport: usize) -> usize {
    selected.saturating_sub(viewport.max(1) / 2)
}
