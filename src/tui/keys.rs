use crate::navigator::Key;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// Terminal key to navigator input. Letter shortcuts (`k`/`j`, `b`, `s`, `e`, `q`) pass
/// through as [`Key::Char`] so a prompt can still receive them as text.
pub fn map_key(key: &KeyEvent) -> Key {
    match key.code {
        KeyCode::Up => Key::Up,
        KeyCode::Down => Key::Down,
        KeyCode::Enter => Key::Enter,
        KeyCode::Left => Key::Left,
        KeyCode::Esc => Key::Esc,
        KeyCode::Backspace => Key::Backspace,
        KeyCode::Char(_) if key.modifiers.contains(KeyModifiers::CONTROL) => Key::Other,
        KeyCode::Char(c) => Key::Char(c),
        _ => Key::Other,
    }
}

pub(super) fn is_interrupt(key: &KeyEvent) -> bool {
    key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn test_map_navigation_keys() {
        assert_eq!(map_key(&press(KeyCode::Up)), Key::Up);
        assert_eq!(map_key(&press(KeyCode::Down)), Key::Down);
        assert_eq!(map_key(&press(KeyCode::Enter)), Key::Enter);
        assert_eq!(map_key(&press(KeyCode::Left)), Key::Left);
        assert_eq!(map_key(&press(KeyCode::Esc)), Key::Esc);
        assert_eq!(map_key(&press(KeyCode::Backspace)), Key::Backspace);
        assert_eq!(map_key(&press(KeyCode::Tab)), Key::Other);
    }

    #[test]
    fn test_map_characters() {
        assert_eq!(map_key(&press(KeyCode::Char('q'))), Key::Char('q'));
        assert_eq!(
            map_key(&KeyEvent::new(KeyCode::Char('S'), KeyModifiers::SHIFT)),
            Key::Char('S')
        );
        assert_eq!(
            map_key(&KeyEvent::new(KeyCode::Char('x'), KeyModifiers::CONTROL)),
            Key::Other
        );
    }

    #[test]
    fn test_interrupt() {
        assert!(is_interrupt(&KeyEvent::new(
            KeyCode::Char('c'),
            KeyModifiers::CONTROL
        )));
        assert!(!is_interrupt(&press(KeyCode::Char('c'))));
    }
}
