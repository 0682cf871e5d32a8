//! winit → Servo keyboard conversion.
//!
//! Servo uses the `keyboard_types` vocabulary (re-exported from `servo::`).
//! The tables below list the keys a video site reacts to; both sides use the
//! W3C UI Events names for them. Anything else reaches the page as
//! `Unidentified`.

use servo::{Code, Key, KeyState, KeyboardEvent, Location, Modifiers, NamedKey};
use winit::event::{ElementState, KeyEvent};
use winit::keyboard::{
    Key as WinitKey, KeyCode, KeyLocation as WinitKeyLocation, ModifiersState,
    NamedKey as WinitNamedKey, PhysicalKey,
};

/// `match` from one enum to another over variants spelled the same on
/// both sides.
macro_rules! same_variants {
    ($value:expr, $from:ident => $to:ident, [$($variant:ident),* $(,)?], $fallback:expr) => {
        match $value {
            $($from::$variant => $to::$variant,)*
            _ => $fallback,
        }
    };
}

pub fn keyboard_event_from_winit(key_event: &KeyEvent, state: ModifiersState) -> KeyboardEvent {
    KeyboardEvent::new_without_event(
        key_state_from_winit(key_event.state),
        key_from_winit(&key_event.logical_key),
        code_from_winit(&key_event.physical_key),
        location_from_winit(key_event.location),
        modifiers_from_winit(state),
        false,
        false,
    )
}

fn key_state_from_winit(state: ElementState) -> KeyState {
    match state {
        ElementState::Pressed => KeyState::Down,
        ElementState::Released => KeyState::Up,
    }
}

fn key_from_winit(logical_key: &WinitKey) -> Key {
    match logical_key {
        WinitKey::Character(string) => Key::Character(string.to_string()),
        // W3C reports the space bar as a character.
        WinitKey::Named(WinitNamedKey::Space) => Key::Character(" ".to_string()),
        WinitKey::Named(WinitNamedKey::Super) => Key::Named(NamedKey::Meta),
        WinitKey::Named(named) => Key::Named(named_key_from_winit(*named)),
        WinitKey::Unidentified(_) | WinitKey::Dead(_) => Key::Named(NamedKey::Unidentified),
    }
}

fn named_key_from_winit(named: WinitNamedKey) -> NamedKey {
    same_variants!(named, WinitNamedKey => NamedKey, [
        // Modifiers
        Alt, AltGraph, CapsLock, Control, Fn, Meta, NumLock, Shift,
        // Whitespace and editing
        Enter, Tab, Backspace, Delete, Insert, Escape,
        // Navigation
        ArrowDown, ArrowLeft, ArrowRight, ArrowUp, End, Home, PageDown, PageUp,
        // Function keys
        F1, F2, F3, F4, F5, F6, F7, F8, F9, F10, F11, F12,
        // Media
        MediaPlayPause, MediaPlay, MediaPause, MediaStop, MediaTrackNext,
        MediaTrackPrevious, MediaFastForward, MediaRewind,
        AudioVolumeDown, AudioVolumeUp, AudioVolumeMute,
        // Browser
        BrowserBack, BrowserForward, BrowserRefresh, BrowserHome,
        // System
        ContextMenu, PrintScreen, Pause,
    ], NamedKey::Unidentified)
}

fn location_from_winit(location: WinitKeyLocation) -> Location {
    match location {
        WinitKeyLocation::Left => Location::Left,
        WinitKeyLocation::Numpad => Location::Numpad,
        WinitKeyLocation::Right => Location::Right,
        WinitKeyLocation::Standard => Location::Standard,
    }
}

fn code_from_winit(physical_key: &PhysicalKey) -> Code {
    let key_code = match physical_key {
        PhysicalKey::Code(key_code) => *key_code,
        PhysicalKey::Unidentified(_) => return Code::Unidentified,
    };
    match key_code {
        KeyCode::SuperLeft => Code::MetaLeft,
        KeyCode::SuperRight => Code::MetaRight,
        other => same_variants!(other, KeyCode => Code, [
            // Writing system keys
            KeyA, KeyB, KeyC, KeyD, KeyE, KeyF, KeyG, KeyH, KeyI, KeyJ, KeyK, KeyL, KeyM,
            KeyN, KeyO, KeyP, KeyQ, KeyR, KeyS, KeyT, KeyU, KeyV, KeyW, KeyX, KeyY, KeyZ,
            Digit0, Digit1, Digit2, Digit3, Digit4, Digit5, Digit6, Digit7, Digit8, Digit9,
            Backquote, Backslash, BracketLeft, BracketRight, Comma, Equal, Minus, Period,
            Quote, Semicolon, Slash,
            // Functional keys
            AltLeft, AltRight, Backspace, CapsLock, ContextMenu, ControlLeft, ControlRight,
            Enter, ShiftLeft, ShiftRight, Space, Tab,
            // Control pad and arrows
            Delete, End, Home, Insert, PageDown, PageUp,
            ArrowDown, ArrowLeft, ArrowRight, ArrowUp,
            // Numpad
            NumLock, Numpad0, Numpad1, Numpad2, Numpad3, Numpad4, Numpad5, Numpad6,
            Numpad7, Numpad8, Numpad9, NumpadAdd, NumpadDecimal, NumpadDivide, NumpadEnter,
            NumpadMultiply, NumpadSubtract,
            // Function section
            Escape, F1, F2, F3, F4, F5, F6, F7, F8, F9, F10, F11, F12,
            PrintScreen, ScrollLock, Pause,
            // Media and browser
            MediaPlayPause, MediaStop, MediaTrackNext, MediaTrackPrevious,
            AudioVolumeDown, AudioVolumeMute, AudioVolumeUp,
            BrowserBack, BrowserForward, BrowserHome, BrowserRefresh,
        ], Code::Unidentified),
    }
}

fn modifiers_from_winit(mods: ModifiersState) -> Modifiers {
    let mut modifiers = Modifiers::empty();
    modifiers.set(Modifiers::CONTROL, mods.control_key());
    modifiers.set(Modifiers::SHIFT, mods.shift_key());
    modifiers.set(Modifiers::ALT, mods.alt_key());
    modifiers.set(Modifiers::META, mods.super_key());
    modifiers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_state() {
        assert_eq!(key_state_from_winit(ElementState::Pressed), KeyState::Down);
        assert_eq!(key_state_from_winit(ElementState::Released), KeyState::Up);
    }

    #[test]
    fn test_character_keys() {
        let key = WinitKey::Character("é".into());
        assert_eq!(key_from_winit(&key), Key::Character("é".to_string()));
    }

    #[test]
    fn test_space_maps_to_character() {
        let key = WinitKey::Named(WinitNamedKey::Space);
        assert_eq!(key_from_winit(&key), Key::Character(" ".to_string()));
    }

    #[test]
    fn test_super_reports_meta() {
        let key = WinitKey::Named(WinitNamedKey::Super);
        assert_eq!(key_from_winit(&key), Key::Named(NamedKey::Meta));
    }

    #[test]
    fn test_unlisted_keys_are_unidentified() {
        let key = WinitKey::Named(WinitNamedKey::Hiragana);
        assert_eq!(key_from_winit(&key), Key::Named(NamedKey::Unidentified));
        assert_eq!(code_from_winit(&PhysicalKey::Code(KeyCode::Lang1)), Code::Unidentified);
    }

    #[test]
    fn test_named_keys_by_name() {
        for (winit, servo) in [
            (WinitNamedKey::Enter, NamedKey::Enter),
            (WinitNamedKey::Escape, NamedKey::Escape),
            (WinitNamedKey::F5, NamedKey::F5),
            (WinitNamedKey::ArrowLeft, NamedKey::ArrowLeft),
            (WinitNamedKey::BrowserBack, NamedKey::BrowserBack),
            (WinitNamedKey::MediaPlayPause, NamedKey::MediaPlayPause),
        ] {
            assert_eq!(key_from_winit(&WinitKey::Named(winit)), Key::Named(servo));
        }
    }

    #[test]
    fn test_codes_by_name() {
        assert_eq!(code_from_winit(&PhysicalKey::Code(KeyCode::KeyA)), Code::KeyA);
        assert_eq!(code_from_winit(&PhysicalKey::Code(KeyCode::Digit1)), Code::Digit1);
        assert_eq!(code_from_winit(&PhysicalKey::Code(KeyCode::SuperLeft)), Code::MetaLeft);
        assert_eq!(code_from_winit(&PhysicalKey::Code(KeyCode::F5)), Code::F5);
        assert_eq!(code_from_winit(&PhysicalKey::Code(KeyCode::Space)), Code::Space);
    }

    #[test]
    fn test_modifiers() {
        let mods = modifiers_from_winit(ModifiersState::CONTROL | ModifiersState::ALT);
        assert!(mods.contains(Modifiers::CONTROL));
        assert!(mods.contains(Modifiers::ALT));
        assert!(!mods.contains(Modifiers::SHIFT));
    }
}
