//! IRC text formatting.

const BOLD: char = '\u{02}';
const COLOR: char = '\u{03}';
const HEX_COLOR: char = '\u{04}';
const RESET: char = '\u{0F}';
const MONOSPACE: char = '\u{11}';
const REVERSE: char = '\u{16}';
const ITALIC: char = '\u{1D}';
const STRIKETHROUGH: char = '\u{1E}';
const UNDERLINE: char = '\u{1F}';

/// Removes formatting control codes, including colour arguments.
pub fn strip_formatting(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            BOLD | RESET | MONOSPACE | REVERSE | ITALIC | STRIKETHROUGH | UNDERLINE => {}
            COLOR => skip_color_args(&mut chars, |c| c.is_ascii_digit(), 2),
            HEX_COLOR => skip_color_args(&mut chars, |c| c.is_ascii_hexdigit(), 6),
            c => out.push(c),
        }
    }
    out
}

/// Skips `fg[,bg]` after a colour code, each at most `width` characters.
fn skip_color_args(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    is_digit: impl Fn(char) -> bool,
    width: usize,
) {
    let take_run = |chars: &mut std::iter::Peekable<std::str::Chars<'_>>| {
        let mut taken = 0;
        while taken < width && chars.peek().copied().is_some_and(&is_digit) {
            chars.next();
            taken += 1;
        }
        taken
    };

    if take_run(chars) == 0 {
        return;
    }
    // Only consume the comma when a background colour follows it.
    let mut lookahead = chars.clone();
    if lookahead.next() == Some(',') && lookahead.peek().copied().is_some_and(&is_digit) {
        chars.next();
        take_run(chars);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_toggles() {
        assert_eq!(strip_formatting("\u{02}bold\u{02} \u{1D}it\u{1D}\u{1F}u\u{1E}s\u{11}m"), "bold itusm");
    }

    #[test]
    fn test_strips_colors() {
        assert_eq!(strip_formatting("\u{03}4red\u{03} plain"), "red plain");
        assert_eq!(strip_formatting("\u{03}04,12text"), "text");
        assert_eq!(strip_formatting("\u{03}3,x"), ",x");
        assert_eq!(strip_formatting("\u{04}FF0000hex"), "hex");
        assert_eq!(strip_formatting("100\u{03}"), "100");
    }
}
