//! Property tests for the field tokenizer.

use csv_cube::tokenizer::Tokenizer;
use proptest::prelude::*;

/// Quote a field the way a writer would: wrap in quotes and double any
/// embedded quote character.
fn quote(field: &str, q: char) -> String {
    let mut out = String::with_capacity(field.len() + 2);
    out.push(q);
    for c in field.chars() {
        if c == q {
            out.push(q);
        }
        out.push(c);
    }
    out.push(q);
    out
}

proptest! {
    #[test]
    fn plain_fields_round_trip(fields in prop::collection::vec("[A-Za-z0-9 ]{0,12}", 1..6)) {
        let tok = Tokenizer::new(',', '"', '\\', false);
        let line = fields.join(",");
        prop_assert_eq!(tok.tokenize(&line), fields);
    }

    #[test]
    fn quoted_fields_round_trip(fields in prop::collection::vec("[A-Za-z0-9,\" ]{0,12}", 1..6)) {
        let tok = Tokenizer::new(',', '"', '\\', false);
        let line = fields
            .iter()
            .map(|f| quote(f, '"'))
            .collect::<Vec<_>>()
            .join(",");
        prop_assert_eq!(tok.tokenize(&line), fields);
    }

    #[test]
    fn whitespace_mode_never_yields_blank_fields(line in "[a-z \t]{0,40}") {
        let tok = Tokenizer::new(' ', '"', '\\', true);
        for field in tok.tokenize(&line) {
            prop_assert!(!field.is_empty());
        }
    }
}
