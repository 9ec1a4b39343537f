//! Message catalogs and language negotiation.
//!
//! The framework's own user-facing strings live in a built-in English
//! catalog. Applications can layer more languages (or override the English
//! strings) with JSON catalogs, and the dispatcher picks a language per
//! request from the client's `Accept-Language` preferences.

use std::collections::HashMap;

/// Framework message keys and their English defaults.
const DEFAULT_EN: &[(&str, &str)] = &[
    ("require.https", "HTTPS is required for all requests"),
    ("missing.required.headers", "Missing required headers"),
    ("invalid.user.agent", "Invalid or missing User-Agent"),
    ("invalid.namespace", "Invalid namespace for this resource"),
    ("route.not.found", "Resource not found"),
    ("method.not.allowed", "Method not allowed for this resource"),
    ("auth.failed", "Authentication failed"),
    ("too.many.requests", "Rate limit exceeded"),
    ("deprecated.namespace", "This namespace is deprecated and will be removed"),
];

/// A set of per-language message catalogs with a fallback language.
pub struct I18n {
    fallback: String,
    catalogs: HashMap<String, HashMap<String, String>>,
}

impl I18n {
    /// Creates the catalog set seeded with the built-in English strings.
    pub fn new() -> Self {
        let en = DEFAULT_EN
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        let mut catalogs = HashMap::new();
        catalogs.insert("en".to_owned(), en);
        Self { fallback: "en".to_owned(), catalogs }
    }

    /// Merges a JSON object of `key → string` pairs into the catalog for
    /// `lang`, creating it if needed. Existing keys are overridden.
    pub fn load(&mut self, lang: &str, data: &str) -> Result<(), serde_json::Error> {
        let parsed: HashMap<String, String> = serde_json::from_str(data)?;
        self.catalogs
            .entry(lang.to_ascii_lowercase())
            .or_default()
            .extend(parsed);
        Ok(())
    }

    pub fn has_lang(&self, lang: &str) -> bool {
        self.catalogs.contains_key(&lang.to_ascii_lowercase())
    }

    /// Picks the first client-accepted language with a catalog, falling back
    /// to the default language.
    pub fn negotiate(&self, accepted: &[(String, f32)]) -> &str {
        for (lang, _) in accepted {
            if let Some((known, _)) = self.catalogs.get_key_value(&lang.to_ascii_lowercase()) {
                return known;
            }
        }
        &self.fallback
    }

    /// Looks a key up in one language's catalog.
    pub fn get(&self, lang: &str, key: &str) -> Option<&str> {
        self.catalogs
            .get(&lang.to_ascii_lowercase())
            .and_then(|catalog| catalog.get(key))
            .map(String::as_str)
    }

    /// Resolves a key through `lang`, then the fallback language; a missing
    /// key resolves to itself so callers always get something printable.
    pub fn message(&self, lang: &str, key: &str) -> String {
        self.get(lang, key)
            .or_else(|| self.get(&self.fallback, key))
            .unwrap_or(key)
            .to_owned()
    }
}

impl Default for I18n {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn english_defaults_are_present() {
        let i18n = I18n::new();
        assert_eq!(i18n.get("en", "route.not.found"), Some("Resource not found"));
    }

    #[test]
    fn user_catalogs_merge_and_negotiate() {
        let mut i18n = I18n::new();
        i18n.load("de", r#"{"route.not.found": "Ressource nicht gefunden"}"#).unwrap();

        let accepted = vec![("de".to_owned(), 1.0), ("en".to_owned(), 0.5)];
        let lang = i18n.negotiate(&accepted);
        assert_eq!(lang, "de");
        assert_eq!(i18n.message(lang, "route.not.found"), "Ressource nicht gefunden");
        // Keys absent from the negotiated catalog fall back to English.
        assert_eq!(i18n.message(lang, "auth.failed"), "Authentication failed");
    }

    #[test]
    fn unknown_language_falls_back() {
        let i18n = I18n::new();
        let accepted = vec![("fr".to_owned(), 1.0)];
        assert_eq!(i18n.negotiate(&accepted), "en");
    }

    #[test]
    fn missing_key_resolves_to_itself() {
        let i18n = I18n::new();
        assert_eq!(i18n.message("en", "no.such.key"), "no.such.key");
    }
}
