//! Boot keyboard scancode table
//!
//! Maps HID keyboard usage codes (usage page 0x07) to display tokens. Letters
//! and digits decode to themselves, everything else to a bracketed name.
//!
//! No modifier state is tracked: a shifted letter decodes to its lowercase
//! token, and modifier usages (0xE0-0xE7) decode to their own bracketed names.
//! Callers needing real keyboard semantics must track modifier state on top.

use serde::Serialize;
use std::fmt;

/// Bytes preceding the key array in a boot keyboard report
/// (modifier bitmap, reserved byte)
pub const REPORT_HEADER_LEN: usize = 2;

/// A decoded key symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Token(&'static str);

impl Token {
    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl PartialEq<&str> for Token {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Decode a single usage code
///
/// Returns `None` for codes with no table entry, including 0 (no key) and the
/// keyboard error codes 1-3.
pub fn decode(code: u8) -> Option<Token> {
    let token = match code {
        0x04 => "a",
        0x05 => "b",
        0x06 => "c",
        0x07 => "d",
        0x08 => "e",
        0x09 => "f",
        0x0a => "g",
        0x0b => "h",
        0x0c => "i",
        0x0d => "j",
        0x0e => "k",
        0x0f => "l",
        0x10 => "m",
        0x11 => "n",
        0x12 => "o",
        0x13 => "p",
        0x14 => "q",
        0x15 => "r",
        0x16 => "s",
        0x17 => "t",
        0x18 => "u",
        0x19 => "v",
        0x1a => "w",
        0x1b => "x",
        0x1c => "y",
        0x1d => "z",
        0x1e => "1",
        0x1f => "2",
        0x20 => "3",
        0x21 => "4",
        0x22 => "5",
        0x23 => "6",
        0x24 => "7",
        0x25 => "8",
        0x26 => "9",
        0x27 => "0",
        0x28 => "[ENTER]",
        0x29 => "[ESC]",
        0x2a => "[BACKSPACE]",
        0x2b => "[TAB]",
        0x2c => "[SPACE]",
        0x2d => "-",
        0x2e => "=",
        0x2f => "[",
        0x30 => "]",
        0x31 => "\\",
        0x32 => "#",
        0x33 => ";",
        0x34 => "'",
        0x35 => "`",
        0x36 => ",",
        0x37 => ".",
        0x38 => "/",
        0x39 => "[CAPSLOCK]",
        0x3a => "[F1]",
        0x3b => "[F2]",
        0x3c => "[F3]",
        0x3d => "[F4]",
        0x3e => "[F5]",
        0x3f => "[F6]",
        0x40 => "[F7]",
        0x41 => "[F8]",
        0x42 => "[F9]",
        0x43 => "[F10]",
        0x44 => "[F11]",
        0x45 => "[F12]",
        0x46 => "[PRINTSCREEN]",
        0x47 => "[SCROLLLOCK]",
        0x48 => "[PAUSE]",
        0x49 => "[INSERT]",
        0x4a => "[HOME]",
        0x4b => "[PAGEUP]",
        0x4c => "[DELETE]",
        0x4d => "[END]",
        0x4e => "[PAGEDOWN]",
        0x4f => "[RIGHT]",
        0x50 => "[LEFT]",
        0x51 => "[DOWN]",
        0x52 => "[UP]",
        0x53 => "[NUMLOCK]",
        0x54 => "[KP_SLASH]",
        0x55 => "[KP_ASTERISK]",
        0x56 => "[KP_MINUS]",
        0x57 => "[KP_PLUS]",
        0x58 => "[KP_ENTER]",
        0x59 => "[KP_1]",
        0x5a => "[KP_2]",
        0x5b => "[KP_3]",
        0x5c => "[KP_4]",
        0x5d => "[KP_5]",
        0x5e => "[KP_6]",
        0x5f => "[KP_7]",
        0x60 => "[KP_8]",
        0x61 => "[KP_9]",
        0x62 => "[KP_0]",
        0x63 => "[KP_DOT]",
        0x64 => "[102ND]",
        0x65 => "[COMPOSE]",
        0x66 => "[POWER]",
        0x67 => "[KP_EQUAL]",
        0x68 => "[F13]",
        0x69 => "[F14]",
        0x6a => "[F15]",
        0x6b => "[F16]",
        0x6c => "[F17]",
        0x6d => "[F18]",
        0x6e => "[F19]",
        0x6f => "[F20]",
        0x70 => "[F21]",
        0x71 => "[F22]",
        0x72 => "[F23]",
        0x73 => "[F24]",
        0x74 => "[EXECUTE]",
        0x75 => "[HELP]",
        0x76 => "[MENU]",
        0x77 => "[SELECT]",
        0x78 => "[STOP]",
        0x79 => "[AGAIN]",
        0x7a => "[UNDO]",
        0x7b => "[CUT]",
        0x7c => "[COPY]",
        0x7d => "[PASTE]",
        0x7e => "[FIND]",
        0x7f => "[MUTE]",
        0x80 => "[VOLUMEUP]",
        0x81 => "[VOLUMEDOWN]",
        0xe0 => "[LCTRL]",
        0xe1 => "[LSHIFT]",
        0xe2 => "[LALT]",
        0xe3 => "[LMETA]",
        0xe4 => "[RCTRL]",
        0xe5 => "[RSHIFT]",
        0xe6 => "[RALT]",
        0xe7 => "[RMETA]",
        _ => return None,
    };
    Some(Token(token))
}

/// Decode the key array of a boot keyboard report
///
/// Skips the two header bytes, filters out zero (no key) slots, and drops
/// codes with no table entry. Token order follows byte order.
pub fn decode_report(report: &[u8]) -> Vec<Token> {
    report
        .iter()
        .skip(REPORT_HEADER_LEN)
        .filter(|&&code| code != 0)
        .filter_map(|&code| decode(code))
        .collect()
}
