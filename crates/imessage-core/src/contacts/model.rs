//! In-memory address book used to turn handles into names.

use std::collections::HashMap;

/// Phone and email lookups built from the address book databases.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressBook {
    phones: HashMap<String, String>,
    emails: HashMap<String, String>,
}

impl AddressBook {
    /// Creates an empty address book.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a phone number for a contact, along with its common variants.
    ///
    /// The exact normalized number always wins; variants only fill gaps so a
    /// later contact cannot steal an earlier contact's exact number.
    pub fn add_phone(&mut self, phone: &str, name: &str) {
        let normalized = normalize_phone(phone);
        if normalized.is_empty() || name.is_empty() {
            return;
        }
        for variant in phone_variants(&normalized).into_iter().skip(1) {
            self.phones
                .entry(variant)
                .or_insert_with(|| name.to_string());
        }
        self.phones.insert(normalized, name.to_string());
    }

    /// Records an email address for a contact.
    pub fn add_email(&mut self, email: &str, name: &str) {
        let email = email.trim().to_lowercase();
        if email.is_empty() || name.is_empty() {
            return;
        }
        self.emails.insert(email, name.to_string());
    }

    /// Resolves a handle to a contact name, or returns the handle unchanged.
    #[must_use]
    pub fn resolve(&self, identifier: &str) -> String {
        self.lookup(identifier)
            .map_or_else(|| identifier.to_string(), str::to_string)
    }

    /// Looks up a handle without falling back.
    #[must_use]
    pub fn lookup(&self, identifier: &str) -> Option<&str> {
        if identifier.is_empty() {
            return None;
        }
        if identifier.contains('@') {
            return self
                .emails
                .get(&identifier.to_lowercase())
                .map(String::as_str);
        }
        let normalized = normalize_phone(identifier);
        phone_variants(&normalized)
            .iter()
            .find_map(|variant| self.phones.get(variant))
            .map(String::as_str)
    }

    /// Number of phone and email entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.phones.len() + self.emails.len()
    }

    /// Whether no entries were loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.phones.is_empty() && self.emails.is_empty()
    }
}

/// Reduces a phone number to digits, keeping a leading `+`.
#[must_use]
pub fn normalize_phone(phone: &str) -> String {
    let phone = phone.trim();
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    if phone.starts_with('+') && !digits.is_empty() {
        format!("+{digits}")
    } else {
        digits
    }
}

/// Common spellings of the same number, starting with the input itself.
///
/// North American numbers are matched with and without the `1` country code.
#[must_use]
pub fn phone_variants(phone: &str) -> Vec<String> {
    if phone.is_empty() {
        return Vec::new();
    }
    let mut variants = vec![phone.to_string()];
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return variants;
    }
    if !phone.starts_with('+') {
        variants.push(format!("+{digits}"));
    }
    if digits.len() == 10 {
        variants.push(format!("+1{digits}"));
        variants.push(format!("1{digits}"));
    } else if digits.len() == 11 && digits.starts_with('1') {
        variants.push(digits[1..].to_string());
        variants.push(format!("+{digits}"));
    }
    variants
}
