//! Language groups: named sets of language codes that share special-case
//! analysis rules (transliteration for Cyrillic, tokenization for CJK).

use crate::i18n::LanguageRegistry;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LanguageGroup {
    /// Every supported language.
    All,
    Cyrillic,
    Cjk,
}

const CYRILLIC: &[&str] = &["ru", "bg", "mk", "ua"];
const CJK: &[&str] = &["zh", "ja"];

impl LanguageGroup {
    /// Group name as used in the lookup tables (e.g. "CYRILLIC").
    pub fn name(&self) -> &'static str {
        match self {
            LanguageGroup::All => "ALL_LANGS",
            LanguageGroup::Cyrillic => "CYRILLIC",
            LanguageGroup::Cjk => "CJK",
        }
    }

    /// Member codes, in registry order for `All`.
    pub fn members(&self) -> Vec<&'static str> {
        match self {
            LanguageGroup::All => LanguageRegistry::get().codes(),
            LanguageGroup::Cyrillic => CYRILLIC.to_vec(),
            LanguageGroup::Cjk => CJK.to_vec(),
        }
    }

    pub fn contains(&self, code: &str) -> bool {
        match self {
            LanguageGroup::All => LanguageRegistry::get().is_supported(code),
            LanguageGroup::Cyrillic => CYRILLIC.contains(&code),
            LanguageGroup::Cjk => CJK.contains(&code),
        }
    }
}

impl fmt::Display for LanguageGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cyrillic_members() {
        let group = LanguageGroup::Cyrillic;
        for code in ["ru", "bg", "mk", "ua"] {
            assert!(group.contains(code), "{} should be Cyrillic", code);
        }
        assert!(!group.contains("en"));
        assert!(!group.contains("he"));
    }

    #[test]
    fn test_cjk_members() {
        assert_eq!(LanguageGroup::Cjk.members(), vec!["zh", "ja"]);
        assert!(!LanguageGroup::Cjk.contains("ko"));
    }

    #[test]
    fn test_all_matches_registry() {
        let all = LanguageGroup::All.members();
        assert_eq!(all.len(), 31);
        assert!(LanguageGroup::All.contains("fa"));
        assert!(!LanguageGroup::All.contains("xx"));
    }

    #[test]
    fn test_groups_are_subsets_of_all() {
        for group in [LanguageGroup::Cyrillic, LanguageGroup::Cjk] {
            for code in group.members() {
                assert!(LanguageGroup::All.contains(code), "{} missing from ALL", code);
            }
        }
    }

    #[test]
    fn test_display_uses_table_name() {
        assert_eq!(LanguageGroup::Cyrillic.to_string(), "CYRILLIC");
        assert_eq!(LanguageGroup::All.to_string(), "ALL_LANGS");
    }
}
