#![forbid(unsafe_code)]

use std::collections::BTreeMap;

/// Extensions named by `enable`.
pub const EXTENSIONS: [&str; 4] = ["f16", "dual_source_blending", "clip_distances", "subgroups"];

/// Language features named by `requires`.
pub const LANGUAGE_FEATURES: [&str; 4] = [
    "readonly_and_readwrite_storage_textures",
    "packed_4x8_integer_dot_product",
    "unrestricted_pointer_parameters",
    "pointer_composite_access",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Feature {
    F16,
    DualSourceBlending,
    ClipDistances,
    Subgroups,
    ReadonlyAndReadwriteStorageTextures,
    Packed4x8IntegerDotProduct,
    UnrestrictedPointerParameters,
    PointerCompositeAccess,
}

impl Feature {
    pub fn name(self) -> &'static str {
        match self {
            Feature::F16 => "f16",
            Feature::DualSourceBlending => "dual_source_blending",
            Feature::ClipDistances => "clip_distances",
            Feature::Subgroups => "subgroups",
            Feature::ReadonlyAndReadwriteStorageTextures => "readonly_and_readwrite_storage_textures",
            Feature::Packed4x8IntegerDotProduct => "packed_4x8_integer_dot_product",
            Feature::UnrestrictedPointerParameters => "unrestricted_pointer_parameters",
            Feature::PointerCompositeAccess => "pointer_composite_access",
        }
    }

    /// Extensions need an `enable` directive; language features are usable
    /// whenever the implementation supports them.
    pub fn is_extension(self) -> bool {
        matches!(
            self,
            Feature::F16 | Feature::DualSourceBlending | Feature::ClipDistances | Feature::Subgroups
        )
    }

    /// The directive that turns the feature on, e.g. `enable f16;`.
    pub fn directive(self) -> String {
        if self.is_extension() {
            format!("enable {};", self.name())
        } else {
            format!("requires {};", self.name())
        }
    }
}

/// Which extensions and language features a compilation accepts.
///
/// Every known name starts enabled; `disable` turns one off so that the
/// matching directive, and any use of the feature, is rejected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeatureSet {
    enabled: BTreeMap<String, bool>,
}

impl Default for FeatureSet {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureSet {
    pub fn new() -> Self {
        let enabled = EXTENSIONS
            .iter()
            .chain(LANGUAGE_FEATURES.iter())
            .map(|name| (name.to_string(), true))
            .collect();
        Self { enabled }
    }

    /// Sets a known feature. Returns `false` when the name is unknown.
    pub fn set(&mut self, name: &str, on: bool) -> bool {
        match self.enabled.get_mut(name) {
            Some(slot) => {
                *slot = on;
                true
            }
            None => false,
        }
    }

    pub fn disable(&mut self, name: &str) -> bool {
        self.set(name, false)
    }

    pub fn with_disabled(mut self, name: &str) -> Self {
        self.disable(name);
        self
    }

    pub fn is_known(&self, name: &str) -> bool {
        self.enabled.contains_key(name)
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled.get(name).copied().unwrap_or(false)
    }

    pub fn is_known_extension(name: &str) -> bool {
        EXTENSIONS.contains(&name)
    }

    pub fn is_known_language_feature(name: &str) -> bool {
        LANGUAGE_FEATURES.contains(&name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.enabled.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn everything_known_starts_enabled() {
        let set = FeatureSet::new();
        for name in EXTENSIONS.iter().chain(LANGUAGE_FEATURES.iter()) {
            assert!(set.is_enabled(name), "{name}");
        }
        assert!(!set.is_enabled("chromium_experimental"));
    }

    #[test]
    fn disabling_unknown_names_is_reported() {
        let mut set = FeatureSet::new();
        assert!(set.disable("f16"));
        assert!(!set.is_enabled("f16"));
        assert!(!set.disable("nope"));
    }

    #[test]
    fn directives_name_the_right_keyword() {
        assert_eq!(Feature::F16.directive(), "enable f16;");
        assert_eq!(
            Feature::PointerCompositeAccess.directive(),
            "requires pointer_composite_access;"
        );
    }
}
