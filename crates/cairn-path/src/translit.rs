//! ASCII transliteration of path components.

/// Latin letters with diacritics and ligatures mapped to plain ASCII.
const TABLE: &[(char, &str)] = &[
    ('à', "a"), ('á', "a"), ('â', "a"), ('ã', "a"), ('ä', "a"), ('å', "a"), ('ā', "a"), ('ă', "a"), ('ą', "a"),
    ('À', "A"), ('Á', "A"), ('Â', "A"), ('Ã', "A"), ('Ä', "A"), ('Å', "A"), ('Ā', "A"), ('Ă', "A"), ('Ą', "A"),
    ('æ', "ae"), ('Æ', "AE"),
    ('ç', "c"), ('ć', "c"), ('č', "c"), ('Ç', "C"), ('Ć', "C"), ('Č', "C"),
    ('ď', "d"), ('đ', "d"), ('Ď', "D"), ('Đ', "D"),
    ('è', "e"), ('é', "e"), ('ê', "e"), ('ë', "e"), ('ē', "e"), ('ė', "e"), ('ę', "e"), ('ě', "e"),
    ('È', "E"), ('É', "E"), ('Ê', "E"), ('Ë', "E"), ('Ē', "E"), ('Ė', "E"), ('Ę', "E"), ('Ě', "E"),
    ('ì', "i"), ('í', "i"), ('î', "i"), ('ï', "i"), ('ī', "i"), ('į', "i"),
    ('Ì', "I"), ('Í', "I"), ('Î', "I"), ('Ï', "I"), ('Ī', "I"), ('Į', "I"),
    ('ĺ', "l"), ('ľ', "l"), ('ł', "l"), ('Ĺ', "L"), ('Ľ', "L"), ('Ł', "L"),
    ('ñ', "n"), ('ń', "n"), ('ň', "n"), ('Ñ', "N"), ('Ń', "N"), ('Ň', "N"),
    ('ò', "o"), ('ó', "o"), ('ô', "o"), ('õ', "o"), ('ö', "o"), ('ø', "o"), ('ō', "o"), ('ő', "o"),
    ('Ò', "O"), ('Ó', "O"), ('Ô', "O"), ('Õ', "O"), ('Ö', "O"), ('Ø', "O"), ('Ō', "O"), ('Ő', "O"),
    ('œ', "oe"), ('Œ', "OE"),
    ('ŕ', "r"), ('ř', "r"), ('Ŕ', "R"), ('Ř', "R"),
    ('ś', "s"), ('š', "s"), ('ş', "s"), ('Ś', "S"), ('Š', "S"), ('Ş', "S"), ('ß', "ss"),
    ('ť', "t"), ('ţ', "t"), ('Ť', "T"), ('Ţ', "T"),
    ('ù', "u"), ('ú', "u"), ('û', "u"), ('ü', "u"), ('ū', "u"), ('ů', "u"), ('ű', "u"), ('ų', "u"),
    ('Ù', "U"), ('Ú', "U"), ('Û', "U"), ('Ü', "U"), ('Ū', "U"), ('Ů', "U"), ('Ű', "U"), ('Ų', "U"),
    ('ý', "y"), ('ÿ', "y"), ('Ý', "Y"), ('Ÿ', "Y"),
    ('ź', "z"), ('ż', "z"), ('ž', "z"), ('Ź', "Z"), ('Ż', "Z"), ('Ž', "Z"),
];

/// Characters allowed verbatim in a canonical component.
pub fn is_allowed(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.')
}

/// Transliterate a single path component.
///
/// Known accented letters become ASCII, every other disallowed character
/// becomes `-`, runs of `-` collapse to one and leading/trailing `-` are
/// trimmed. The result may be empty.
pub fn transliterate(component: &str) -> String {
    let mut out = String::with_capacity(component.len());
    for ch in component.chars() {
        if is_allowed(ch) {
            out.push(ch);
        } else if let Some((_, ascii)) = TABLE.iter().find(|(c, _)| *c == ch) {
            out.push_str(ascii);
        } else {
            out.push('-');
        }
    }

    let mut collapsed = String::with_capacity(out.len());
    for ch in out.chars() {
        if ch == '-' && collapsed.ends_with('-') {
            continue;
        }
        collapsed.push(ch);
    }
    collapsed.trim_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_passes_through() {
        assert_eq!(transliterate("ROOT"), "ROOT");
        assert_eq!(transliterate("logo.png"), "logo.png");
        assert_eq!(transliterate("a_b-c"), "a_b-c");
    }

    #[test]
    fn diacritics_are_mapped() {
        assert_eq!(transliterate("Žluťoučký kůň"), "Zlutoucky-kun");
        assert_eq!(transliterate("Straße"), "Strasse");
    }

    #[test]
    fn unknown_characters_collapse() {
        assert_eq!(transliterate("a  ?? b"), "a-b");
        assert_eq!(transliterate("--x--"), "x");
        assert_eq!(transliterate("???"), "");
    }
}
