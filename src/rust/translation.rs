//! Localization of diagnosis text through an external translation capability.
//!
//! The translator itself (an on-device translation engine, a remote API, a
//! dictionary) lives outside this crate. [`LocalizationService`] only decides
//! when to call it and falls back to the original English text whenever it
//! cannot help.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use log::{debug, info, warn};

use crate::detector::{DiseaseResult, TranslationError};

/// Language the catalog is written in. Translation to it is a no-op.
pub const BASE_LANGUAGE: &str = "en";

/// Maps an app language code to the code passed to the translator.
///
/// Returns `None` for languages the translator cannot produce, in which case
/// text is shown untranslated.
pub fn translation_target(code: &str) -> Option<&'static str> {
    match code {
        "hi" => Some("hi"),
        "te" => Some("te"),
        "ta" => Some("ta"),
        "bn" => Some("bn"),
        "gu" => Some("gu"),
        "kn" => Some("kn"),
        "mr" => Some("mr"),
        "ur" => Some("ur"),
        "en" => Some(BASE_LANGUAGE),
        // Malayalam, Odia and Punjabi have no on-device model
        "ml" | "or" | "pa" => None,
        _ => None,
    }
}

/// Text translation from English into a target language.
pub trait Translator: Send + Sync {
    /// Makes the target language usable, e.g. by fetching its model.
    /// Called once per language before the first translation.
    fn prepare(&self, _target: &str) -> Result<(), TranslationError> {
        Ok(())
    }

    fn translate(&self, text: &str, target: &str) -> Result<String, TranslationError>;
}

/// Source of the user's selected language code.
pub trait LanguagePreference: Send + Sync {
    fn language_code(&self) -> Option<String>;
}

/// A preference fixed at construction time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FixedLanguage(Option<String>);

impl FixedLanguage {
    pub fn new(code: impl Into<String>) -> Self {
        Self(Some(code.into()))
    }

    pub fn unset() -> Self {
        Self(None)
    }
}

impl LanguagePreference for FixedLanguage {
    fn language_code(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Translates diagnosis text, never failing.
pub struct LocalizationService {
    translator: Arc<dyn Translator>,
    prepared: Mutex<HashSet<&'static str>>,
}

impl LocalizationService {
    pub fn new(translator: Arc<dyn Translator>) -> Self {
        Self {
            translator,
            prepared: Mutex::new(HashSet::new()),
        }
    }

    fn resolve(code: Option<&str>) -> Option<&'static str> {
        let code = code?.trim();
        if code.is_empty() || code == BASE_LANGUAGE {
            return None;
        }
        match translation_target(code) {
            Some(BASE_LANGUAGE) | None => {
                debug!("No translation needed for language: {}", code);
                None
            }
            Some(target) => Some(target),
        }
    }

    fn ensure_prepared(&self, target: &'static str) -> bool {
        if self.is_prepared(target) {
            return true;
        }
        match self.translator.prepare(target) {
            Ok(()) => {
                info!("Translation model ready for: {}", target);
                self.prepared
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .insert(target);
                true
            }
            Err(e) => {
                warn!("Failed to prepare translator for {}: {}", target, e);
                false
            }
        }
    }

    pub fn is_prepared(&self, target: &str) -> bool {
        self.prepared
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(target)
    }

    /// Translates `text` into `code`, returning the original text when the
    /// code is absent, English or unsupported, when the text is blank, or
    /// when the translator fails.
    pub fn translate_text(&self, text: &str, code: Option<&str>) -> String {
        if text.trim().is_empty() {
            return text.to_string();
        }
        let Some(target) = Self::resolve(code) else {
            return text.to_string();
        };
        if !self.ensure_prepared(target) {
            return text.to_string();
        }

        match self.translator.translate(text, target) {
            Ok(translated) => {
                debug!("Translated '{}' -> '{}' ({})", text, translated, target);
                translated
            }
            Err(e) => {
                warn!("Translation error for '{}' ({}): {}", text, target, e);
                text.to_string()
            }
        }
    }

    /// Translates each text independently; failures keep the original item.
    pub fn translate_texts(&self, texts: &[String], code: Option<&str>) -> Vec<String> {
        let Some(target) = Self::resolve(code) else {
            return texts.to_vec();
        };
        if !self.ensure_prepared(target) {
            return texts.to_vec();
        }
        texts
            .iter()
            .map(|text| self.translate_text(text, Some(target)))
            .collect()
    }

    /// Returns a copy of `result` with name and treatment in the preferred language.
    pub fn localize(&self, result: &DiseaseResult, preference: &dyn LanguagePreference) -> DiseaseResult {
        let code = preference.language_code();
        let code = code.as_deref();
        DiseaseResult {
            disease_name: self.translate_text(&result.disease_name, code),
            confidence: result.confidence,
            treatment: self.translate_text(&result.treatment, code),
        }
    }

    /// Forgets which languages were prepared.
    pub fn clear_cache(&self) {
        self.prepared
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
        debug!("Translation cache cleared");
    }
}
