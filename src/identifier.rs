//! Identifier validation for component names and scope keys.

use lazy_static::lazy_static;
use std::collections::HashSet;

lazy_static! {
    static ref RESERVED_WORDS: HashSet<&'static str> = {
        let mut s = HashSet::new();
        for word in [
            "break", "case", "catch", "class", "const", "continue", "debugger", "default",
            "delete", "do", "else", "enum", "export", "extends", "false", "finally", "for",
            "function", "if", "import", "in", "instanceof", "new", "null", "return", "super",
            "switch", "this", "throw", "true", "try", "typeof", "var", "void", "while", "with",
            "yield", "let", "static", "implements", "interface", "package", "private",
            "protected", "public", "await", "arguments", "eval", "undefined", "NaN", "Infinity",
        ] {
            s.insert(word);
        }
        // Parameter names of the generated wrappers
        s.insert("scope");
        s.insert("props");
        s.insert("transform");
        s
    };
}

/// Returns true if `name` can be used as a binding in generated code.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();

    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }

    if !chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$') {
        return false;
    }

    !RESERVED_WORDS.contains(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_names() {
        assert!(is_valid_identifier("Foo"));
        assert!(is_valid_identifier("_private"));
        assert!(is_valid_identifier("$store"));
        assert!(is_valid_identifier("Card2"));
        assert!(is_valid_identifier("Überschrift"));
    }

    #[test]
    fn test_rejected_names() {
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("2Fast"));
        assert!(!is_valid_identifier("my-component"));
        assert!(!is_valid_identifier("with space"));
        assert!(!is_valid_identifier("Global.Foo"));
        assert!(!is_valid_identifier("class"));
        assert!(!is_valid_identifier("props"));
        assert!(!is_valid_identifier("scope"));
    }
}
