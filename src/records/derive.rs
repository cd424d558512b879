//! Derived Code
//!
//! Computes the 16-character identifier stored in `derived_code` from the
//! five biographical fields of a person.

/// Length of a complete derived code.
pub const CODE_LEN: usize = 16;

/// Width of each name-like component (surname, given name, birth city).
const COMPONENT_LEN: usize = 3;

/// Filler used when a name-like component has fewer than three letters.
const FILLER: char = 'X';

/// Derive the code for a person, or `None` when any input is empty.
///
/// Layout: surname(3) + given name(3) + birth date without `-` + sex(1) + birth city(3),
/// truncated as a whole to [`CODE_LEN`] characters. The date is not validated, so a
/// date that is not exactly eight digits moves the truncation point.
pub fn derive_code(
    given_name: &str,
    surname: &str,
    birth_date: &str,
    sex: &str,
    birth_city: &str,
) -> Option<String> {
    if [given_name, surname, birth_date, sex, birth_city]
        .iter()
        .any(|s| s.is_empty())
    {
        return None;
    }

    let sex_code = sex.chars().next()?.to_uppercase().collect::<String>();

    let mut code = String::with_capacity(CODE_LEN + 4);
    code.push_str(&name_component(surname));
    code.push_str(&name_component(given_name));
    code.extend(birth_date.chars().filter(|c| *c != '-'));
    code.push_str(&sex_code);
    code.push_str(&name_component(birth_city));

    Some(code.chars().take(CODE_LEN).collect())
}

/// Uppercase, keep letters only, take three, pad with `X`.
fn name_component(value: &str) -> String {
    let mut part: String = value
        .to_uppercase()
        .chars()
        .filter(|c| c.is_alphabetic())
        .take(COMPONENT_LEN)
        .collect();

    while part.chars().count() < COMPONENT_LEN {
        part.push(FILLER);
    }
    part
}
