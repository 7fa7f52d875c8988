use super::ParameterCollection;
use crate::statement::Statement;

const SIGILS: [char; 3] = [':', '$', '@'];

/// Synthetic name for the `n`th positional parameter of a command.
pub(crate) fn positional_alias(n: usize) -> String {
    format!(";{n}")
}

fn has_sigil(name: &str) -> bool {
    name.starts_with(SIGILS)
}

fn eq_ignore_case(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b) || (!a.is_ascii() && a.to_lowercase() == b.to_lowercase())
}

/// Compare a slot name with a parameter key, case-insensitively, tolerating a leading
/// `:`/`$`/`@` on one side only.
pub(crate) fn names_match(slot: &str, key: &str) -> bool {
    match (has_sigil(slot), has_sigil(key)) {
        (true, false) => eq_ignore_case(&slot[1..], key),
        (false, true) => eq_ignore_case(slot, &key[1..]),
        _ => eq_ignore_case(slot, key),
    }
}

/// Remap every parameter onto every statement, then clear the dirty flag.
pub(crate) fn map_all(params: &mut ParameterCollection, statements: &mut [Statement]) {
    map_into(params, statements);
    params.mark_clean();
}

/// Map parameters onto one freshly built statement. The dirty flag is left alone since
/// the other statements of the command were not touched.
pub(crate) fn map_one(params: &ParameterCollection, statement: &mut Statement) {
    map_into(params, std::slice::from_mut(statement));
}

fn map_into(params: &ParameterCollection, statements: &mut [Statement]) {
    for stmt in statements.iter_mut() {
        stmt.clear_mapping();
    }

    let mut unnamed = 0;
    for (ordinal, param) in params.iter().enumerate() {
        let key = match param.name() {
            Some(name) => name.to_string(),
            None => {
                unnamed += 1;
                positional_alias(unnamed - 1)
            }
        };

        let mut mapped = false;
        for stmt in statements.iter_mut() {
            mapped |= stmt.map_slot(&key, ordinal);
        }

        // a named parameter against unnamed placeholders binds by its position
        if !mapped {
            let key = positional_alias(ordinal);
            for stmt in statements.iter_mut() {
                mapped |= stmt.map_slot(&key, ordinal);
            }
        }

        if !mapped {
            tracing::trace!(ordinal, key = %key, "parameter matched no statement slot");
        }
    }
}
