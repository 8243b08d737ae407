//! Language tags and the extension → language mapping table.
//!
//! ## Supported Languages
//!
//! Python, JavaScript, TypeScript (and TSX), Rust, Go, C, C++, C#, Java,
//! Ruby, PHP, Swift, Kotlin, Scala, Elixir, Zig, Solidity, Dart, Gleam, plus
//! Vue and Svelte single-file components.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use ckg_config::LanguagesConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Language tags
// ============================================================================

/// Language tag attached to every file and entity of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    JavaScript,
    TypeScript,
    Tsx,
    Rust,
    Go,
    C,
    Cpp,
    CSharp,
    Java,
    Ruby,
    Php,
    Swift,
    Kotlin,
    Scala,
    Elixir,
    Zig,
    Solidity,
    Dart,
    Gleam,
    Vue,
    Svelte,
}

impl Language {
    /// Every language tag, in declaration order.
    pub const ALL: [Language; 22] = [
        Language::Python,
        Language::JavaScript,
        Language::TypeScript,
        Language::Tsx,
        Language::Rust,
        Language::Go,
        Language::C,
        Language::Cpp,
        Language::CSharp,
        Language::Java,
        Language::Ruby,
        Language::Php,
        Language::Swift,
        Language::Kotlin,
        Language::Scala,
        Language::Elixir,
        Language::Zig,
        Language::Solidity,
        Language::Dart,
        Language::Gleam,
        Language::Vue,
        Language::Svelte,
    ];

    /// Tag as stored in the `language` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Tsx => "tsx",
            Language::Rust => "rust",
            Language::Go => "go",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::CSharp => "csharp",
            Language::Java => "java",
            Language::Ruby => "ruby",
            Language::Php => "php",
            Language::Swift => "swift",
            Language::Kotlin => "kotlin",
            Language::Scala => "scala",
            Language::Elixir => "elixir",
            Language::Zig => "zig",
            Language::Solidity => "solidity",
            Language::Dart => "dart",
            Language::Gleam => "gleam",
            Language::Vue => "vue",
            Language::Svelte => "svelte",
        }
    }

    /// Whether files of this language are single-file components whose
    /// script block is parsed with an ECMAScript grammar.
    pub fn is_single_file_component(&self) -> bool {
        matches!(self, Language::Vue | Language::Svelte)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for an unrecognized language tag.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown language tag '{0}'")]
pub struct UnknownLanguage(pub String);

impl FromStr for Language {
    type Err = UnknownLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim().to_ascii_lowercase();
        let language = match tag.as_str() {
            "python" | "py" => Language::Python,
            "javascript" | "js" => Language::JavaScript,
            "typescript" | "ts" => Language::TypeScript,
            "tsx" => Language::Tsx,
            "rust" | "rs" => Language::Rust,
            "go" | "golang" => Language::Go,
            "c" => Language::C,
            "cpp" | "c++" => Language::Cpp,
            "csharp" | "c#" | "cs" => Language::CSharp,
            "java" => Language::Java,
            "ruby" | "rb" => Language::Ruby,
            "php" => Language::Php,
            "swift" => Language::Swift,
            "kotlin" | "kt" => Language::Kotlin,
            "scala" => Language::Scala,
            "elixir" | "ex" => Language::Elixir,
            "zig" => Language::Zig,
            "solidity" | "sol" => Language::Solidity,
            "dart" => Language::Dart,
            "gleam" => Language::Gleam,
            "vue" => Language::Vue,
            "svelte" => Language::Svelte,
            _ => return Err(UnknownLanguage(s.to_string())),
        };
        Ok(language)
    }
}

// ============================================================================
// Extension mapping
// ============================================================================

/// Default extension table (lowercase, without the dot).
const DEFAULT_EXTENSIONS: &[(&str, Language)] = &[
    ("c", Language::C),
    ("h", Language::C),
    ("c++", Language::Cpp),
    ("cc", Language::Cpp),
    ("cpp", Language::Cpp),
    ("cxx", Language::Cpp),
    ("hpp", Language::Cpp),
    ("hxx", Language::Cpp),
    ("cs", Language::CSharp),
    ("dart", Language::Dart),
    ("ex", Language::Elixir),
    ("exs", Language::Elixir),
    ("gleam", Language::Gleam),
    ("go", Language::Go),
    ("java", Language::Java),
    ("cjs", Language::JavaScript),
    ("js", Language::JavaScript),
    ("jsx", Language::JavaScript),
    ("mjs", Language::JavaScript),
    ("kt", Language::Kotlin),
    ("kts", Language::Kotlin),
    ("php", Language::Php),
    ("php3", Language::Php),
    ("php4", Language::Php),
    ("php5", Language::Php),
    ("phtml", Language::Php),
    ("py", Language::Python),
    ("pyw", Language::Python),
    ("rb", Language::Ruby),
    ("rbw", Language::Ruby),
    ("rs", Language::Rust),
    ("sc", Language::Scala),
    ("scala", Language::Scala),
    ("sol", Language::Solidity),
    ("svelte", Language::Svelte),
    ("swift", Language::Swift),
    ("ts", Language::TypeScript),
    ("mts", Language::TypeScript),
    ("cts", Language::TypeScript),
    ("tsx", Language::Tsx),
    ("vue", Language::Vue),
    ("zig", Language::Zig),
];

/// Extension → language table supplied to a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageMap {
    by_extension: HashMap<String, Language>,
}

impl Default for LanguageMap {
    fn default() -> Self {
        let by_extension = DEFAULT_EXTENSIONS
            .iter()
            .map(|(ext, lang)| (ext.to_string(), *lang))
            .collect();
        Self { by_extension }
    }
}

impl LanguageMap {
    /// Create an empty table.
    pub fn empty() -> Self {
        Self {
            by_extension: HashMap::new(),
        }
    }

    /// Build the table from defaults plus configured adjustments.
    ///
    /// Configured extensions replace or extend the defaults; disabled
    /// languages are removed afterwards, whichever extension maps to them.
    pub fn from_config(config: &LanguagesConfig) -> Result<Self, UnknownLanguage> {
        let mut map = Self::default();

        for (ext, tag) in &config.extensions {
            let language: Language = tag.parse()?;
            map.insert(ext, language);
        }

        let disabled = config
            .disabled
            .iter()
            .map(|tag| tag.parse::<Language>())
            .collect::<Result<Vec<_>, _>>()?;
        map.by_extension
            .retain(|_, language| !disabled.contains(language));

        Ok(map)
    }

    /// Map an extension (with or without leading dot) to a language.
    pub fn insert(&mut self, extension: &str, language: Language) {
        let ext = extension.trim_start_matches('.').to_ascii_lowercase();
        self.by_extension.insert(ext, language);
    }

    /// Look up a language by extension.
    pub fn for_extension(&self, extension: &str) -> Option<Language> {
        let ext = extension.trim_start_matches('.').to_ascii_lowercase();
        self.by_extension.get(&ext).copied()
    }

    /// Resolve the language of a file path from its extension.
    pub fn resolve(&self, path: &Path) -> Option<Language> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(|e| self.for_extension(e))
    }

    /// Number of mapped extensions.
    pub fn len(&self) -> usize {
        self.by_extension.len()
    }

    /// Whether no extension is mapped.
    pub fn is_empty(&self) -> bool {
        self.by_extension.is_empty()
    }

    /// Mapped extensions, sorted.
    pub fn extensions(&self) -> Vec<&str> {
        let mut exts: Vec<&str> = self.by_extension.keys().map(String::as_str).collect();
        exts.sort_unstable();
        exts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_roundtrip() {
        for language in Language::ALL {
            assert_eq!(language.as_str().parse::<Language>(), Ok(language));
        }
        assert_eq!("C#".parse::<Language>(), Ok(Language::CSharp));
        assert!("cobol".parse::<Language>().is_err());
    }

    #[test]
    fn test_default_table() {
        let map = LanguageMap::default();
        assert_eq!(map.resolve(Path::new("src/main.rs")), Some(Language::Rust));
        assert_eq!(map.resolve(Path::new("app/View.TSX")), Some(Language::Tsx));
        assert_eq!(map.resolve(Path::new("lib.hxx")), Some(Language::Cpp));
        assert_eq!(map.resolve(Path::new("mix.exs")), Some(Language::Elixir));
        assert_eq!(map.resolve(Path::new("App.vue")), Some(Language::Vue));
        assert_eq!(map.resolve(Path::new("lib/main.dart")), Some(Language::Dart));
        assert_eq!(map.resolve(Path::new("src/app.gleam")), Some(Language::Gleam));
        assert_eq!(map.resolve(Path::new("README.md")), None);
        assert_eq!(map.resolve(Path::new("Makefile")), None);
    }

    #[test]
    fn test_from_config_overrides_and_disables() {
        let mut config = LanguagesConfig::default();
        config
            .extensions
            .insert("h".to_string(), "cpp".to_string());
        config
            .extensions
            .insert("pyi".to_string(), "python".to_string());
        config.disabled.push("php".to_string());

        let map = LanguageMap::from_config(&config).unwrap();
        assert_eq!(map.for_extension("h"), Some(Language::Cpp));
        assert_eq!(map.for_extension(".pyi"), Some(Language::Python));
        assert_eq!(map.for_extension("php"), None);
        assert_eq!(map.for_extension("phtml"), None);
    }

    #[test]
    fn test_from_config_rejects_unknown_tag() {
        let mut config = LanguagesConfig::default();
        config
            .extensions
            .insert("cob".to_string(), "cobol".to_string());
        let err = LanguageMap::from_config(&config).unwrap_err();
        assert_eq!(err, UnknownLanguage("cobol".to_string()));
    }
}
