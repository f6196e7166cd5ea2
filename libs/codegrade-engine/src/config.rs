// Evaluator configuration: language recipes, timeouts, logic backend
use anyhow::{bail, Context, Result};
use codegrade_common::language::SupportedLanguage;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_COMPILE_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_LOGIC_TIMEOUT: Duration = Duration::from_secs(30);

/// How to build and run one language. Argument templates may use the
/// placeholders `{source}`, `{binary}`, `{dir}`, `{class}` (the file's class)
/// and `{main_class}` (the class declaring `main`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageRecipe {
    pub name: SupportedLanguage,
    pub extension: String,
    /// File name template for the scratch source file; `main.<ext>` if unset
    #[serde(default)]
    pub source_file: Option<String>,
    #[serde(default)]
    pub compile: Option<Vec<String>>,
    pub run: Vec<String>,
}

impl LanguageRecipe {
    /// Executable that must exist on the host for this recipe to work.
    /// The compiler when there is one, otherwise the interpreter.
    pub fn toolchain(&self) -> &str {
        self.compile
            .as_ref()
            .and_then(|c| c.first())
            .or_else(|| self.run.first())
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn source_file_name(&self, class_name: &str) -> String {
        match &self.source_file {
            Some(template) => template.replace("{class}", class_name),
            None => format!("main.{}", self.extension),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.run.is_empty() {
            bail!("Recipe for '{}' has an empty run command", self.name);
        }
        if let Some(compile) = &self.compile {
            if compile.is_empty() {
                bail!("Recipe for '{}' has an empty compile command", self.name);
            }
        }
        if self.extension.trim().is_empty() {
            bail!("Recipe for '{}' has no file extension", self.name);
        }
        Ok(())
    }
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

fn builtin_recipe(language: SupportedLanguage) -> LanguageRecipe {
    match language {
        SupportedLanguage::Python => LanguageRecipe {
            name: language,
            extension: "py".to_string(),
            source_file: None,
            compile: None,
            run: argv(&["python3", "{source}"]),
        },
        SupportedLanguage::C => LanguageRecipe {
            name: language,
            extension: "c".to_string(),
            source_file: None,
            compile: Some(argv(&["gcc", "{source}", "-o", "{binary}", "-lm"])),
            run: argv(&["{binary}"]),
        },
        SupportedLanguage::Cpp => LanguageRecipe {
            name: language,
            extension: "cpp".to_string(),
            source_file: None,
            compile: Some(argv(&["g++", "-std=c++17", "-O2", "{source}", "-o", "{binary}"])),
            run: argv(&["{binary}"]),
        },
        SupportedLanguage::Java => LanguageRecipe {
            name: language,
            extension: "java".to_string(),
            source_file: Some("{class}.java".to_string()),
            compile: Some(argv(&["javac", "{source}"])),
            run: argv(&["java", "-cp", "{dir}", "{main_class}"]),
        },
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LanguagesJson {
    languages: Vec<LanguageRecipe>,
}

/// Recipe registry. Always holds a recipe for every supported language;
/// a `languages.json` file only overrides entries.
#[derive(Debug, Clone)]
pub struct LanguageConfigManager {
    recipes: HashMap<SupportedLanguage, LanguageRecipe>,
}

impl Default for LanguageConfigManager {
    fn default() -> Self {
        Self::builtin()
    }
}

impl LanguageConfigManager {
    pub fn builtin() -> Self {
        let recipes = SupportedLanguage::ALL
            .iter()
            .map(|&lang| (lang, builtin_recipe(lang)))
            .collect();
        Self { recipes }
    }

    /// Load overrides from a languages.json file on top of the built-ins
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            bail!("Language config file not found: {}", config_path.display());
        }

        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        Self::from_json(&content)
            .with_context(|| format!("Failed to load {}", config_path.display()))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let languages_json: LanguagesJson =
            serde_json::from_str(content).context("Failed to parse languages JSON")?;

        let mut manager = Self::builtin();
        for recipe in languages_json.languages {
            recipe.validate()?;
            manager.recipes.insert(recipe.name, recipe);
        }
        Ok(manager)
    }

    /// Replace a single recipe
    pub fn with_recipe(mut self, recipe: LanguageRecipe) -> Self {
        self.recipes.insert(recipe.name, recipe);
        self
    }

    pub fn get(&self, language: SupportedLanguage) -> &LanguageRecipe {
        // Every variant is inserted by `builtin()` and entries are only replaced
        &self.recipes[&language]
    }

    /// All recipes in a stable order
    pub fn recipes(&self) -> Vec<&LanguageRecipe> {
        SupportedLanguage::ALL.iter().map(|&l| self.get(l)).collect()
    }
}

/// Flavour of remote logic-assessment service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Ollama,
    HuggingFace,
    OpenAi,
}

impl BackendKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ollama" => Some(BackendKind::Ollama),
            "huggingface" | "hf" => Some(BackendKind::HuggingFace),
            "openai" => Some(BackendKind::OpenAi),
            _ => None,
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            BackendKind::Ollama => "llama3",
            BackendKind::HuggingFace => "mistralai/Mistral-7B-Instruct-v0.2",
            BackendKind::OpenAi => "gpt-4o-mini",
        }
    }

    fn default_url(&self, model: &str) -> String {
        match self {
            BackendKind::Ollama => "http://localhost:11434".to_string(),
            BackendKind::HuggingFace => format!("https://api-inference.huggingface.co/models/{}", model),
            BackendKind::OpenAi => "https://api.openai.com/v1".to_string(),
        }
    }

    fn requires_key(&self) -> bool {
        !matches!(self, BackendKind::Ollama)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout: Duration,
}

impl BackendConfig {
    /// Resolve the backend from environment-style lookups.
    /// Returns `None` (backend disabled) when neither an endpoint nor a
    /// credential is configured, or when a keyed service has no key.
    pub fn from_lookup<F>(lookup: &F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let explicit = non_empty("CODEGRADE_LOGIC_BACKEND").and_then(|v| BackendKind::parse(&v));
        let url = non_empty("CODEGRADE_LOGIC_URL");
        let api_key = non_empty("CODEGRADE_LOGIC_API_KEY");

        let kind = match (explicit, &url, &api_key) {
            (Some(kind), _, _) => kind,
            (None, Some(_), _) => BackendKind::Ollama,
            (None, None, Some(_)) => BackendKind::HuggingFace,
            (None, None, None) => return None,
        };

        if kind.requires_key() && api_key.is_none() {
            return None;
        }

        let model = non_empty("CODEGRADE_LOGIC_MODEL").unwrap_or_else(|| kind.default_model().to_string());
        let timeout = non_empty("CODEGRADE_LOGIC_TIMEOUT_SECS")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_LOGIC_TIMEOUT);

        Some(Self {
            kind,
            url: url.unwrap_or_else(|| kind.default_url(&model)),
            api_key,
            model,
            timeout,
        })
    }
}

/// Everything the Aggregator needs, passed in explicitly at construction
#[derive(Debug, Clone)]
pub struct EvaluatorConfig {
    pub run_timeout: Duration,
    pub compile_timeout: Duration,
    pub compile_once: bool,
    pub parallel_tests: bool,
    pub submission_budget: Option<Duration>,
    pub backend: Option<BackendConfig>,
    pub languages: LanguageConfigManager,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            run_timeout: DEFAULT_RUN_TIMEOUT,
            compile_timeout: DEFAULT_COMPILE_TIMEOUT,
            compile_once: false,
            parallel_tests: false,
            submission_budget: None,
            backend: None,
            languages: LanguageConfigManager::builtin(),
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

impl EvaluatorConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let millis = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok()).map(Duration::from_millis);
        let secs = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok()).map(Duration::from_secs);

        let languages = match lookup("CODEGRADE_LANGUAGES_CONFIG") {
            Some(path) if !path.trim().is_empty() => LanguageConfigManager::load(Path::new(path.trim()))?,
            _ => defaults.languages,
        };

        Ok(Self {
            run_timeout: millis("CODEGRADE_RUN_TIMEOUT_MS").unwrap_or(defaults.run_timeout),
            compile_timeout: secs("CODEGRADE_COMPILE_TIMEOUT_SECS").unwrap_or(defaults.compile_timeout),
            compile_once: lookup("CODEGRADE_COMPILE_ONCE").map(|v| parse_flag(&v)).unwrap_or(false),
            parallel_tests: lookup("CODEGRADE_PARALLEL_TESTS").map(|v| parse_flag(&v)).unwrap_or(false),
            submission_budget: secs("CODEGRADE_SUBMISSION_BUDGET_SECS"),
            backend: BackendConfig::from_lookup(&lookup),
            languages,
        })
    }

    pub fn logic_timeout(&self) -> Duration {
        self.backend.as_ref().map(|b| b.timeout).unwrap_or(DEFAULT_LOGIC_TIMEOUT)
    }

    /// Total wall-time allowed for one submission.
    /// Defaults to run timeout × test count + logic timeout + compile timeout.
    pub fn budget_for(&self, test_count: usize) -> Duration {
        self.submission_budget.unwrap_or_else(|| {
            self.run_timeout * test_count as u32 + self.logic_timeout() + self.compile_timeout
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_builtin_recipes_cover_every_language() {
        let manager = LanguageConfigManager::builtin();
        assert_eq!(manager.recipes().len(), 4);
        assert_eq!(manager.get(SupportedLanguage::C).toolchain(), "gcc");
        assert_eq!(manager.get(SupportedLanguage::Cpp).toolchain(), "g++");
        assert_eq!(manager.get(SupportedLanguage::Java).toolchain(), "javac");
        assert_eq!(manager.get(SupportedLanguage::Python).toolchain(), "python3");
    }

    #[test]
    fn test_source_file_names() {
        let manager = LanguageConfigManager::builtin();
        assert_eq!(manager.get(SupportedLanguage::Java).source_file_name("Solution"), "Solution.java");
        assert_eq!(manager.get(SupportedLanguage::Python).source_file_name("Main"), "main.py");
    }

    #[test]
    fn test_json_overrides_single_recipe() {
        let json = r#"{"languages":[{"name":"python","extension":"py","run":["pypy3","{source}"]}]}"#;
        let manager = LanguageConfigManager::from_json(json).unwrap();
        assert_eq!(manager.get(SupportedLanguage::Python).run[0], "pypy3");
        assert_eq!(manager.get(SupportedLanguage::C).toolchain(), "gcc");
    }

    #[test]
    fn test_json_rejects_empty_run() {
        let json = r#"{"languages":[{"name":"c","extension":"c","run":[]}]}"#;
        assert!(LanguageConfigManager::from_json(json).is_err());
    }

    #[test]
    fn test_backend_disabled_without_url_or_key() {
        let config = EvaluatorConfig::from_lookup(lookup_from(&[])).unwrap();
        assert!(config.backend.is_none());
        assert_eq!(config.run_timeout, DEFAULT_RUN_TIMEOUT);
        assert!(!config.compile_once);
    }

    #[test]
    fn test_backend_url_only_means_ollama() {
        let lookup = lookup_from(&[("CODEGRADE_LOGIC_URL", "http://ollama:11434")]);
        let backend = BackendConfig::from_lookup(&lookup).unwrap();
        assert_eq!(backend.kind, BackendKind::Ollama);
        assert_eq!(backend.model, "llama3");
        assert_eq!(backend.timeout, DEFAULT_LOGIC_TIMEOUT);
    }

    #[test]
    fn test_keyed_backend_without_key_is_disabled() {
        let lookup = lookup_from(&[("CODEGRADE_LOGIC_BACKEND", "openai")]);
        assert!(BackendConfig::from_lookup(&lookup).is_none());
    }

    #[test]
    fn test_key_only_means_huggingface() {
        let lookup = lookup_from(&[("CODEGRADE_LOGIC_API_KEY", "hf_token"), ("CODEGRADE_LOGIC_TIMEOUT_SECS", "12")]);
        let backend = BackendConfig::from_lookup(&lookup).unwrap();
        assert_eq!(backend.kind, BackendKind::HuggingFace);
        assert!(backend.url.ends_with(BackendKind::HuggingFace.default_model()));
        assert_eq!(backend.timeout, Duration::from_secs(12));
    }

    #[test]
    fn test_flags_and_timeouts_from_env() {
        let config = EvaluatorConfig::from_lookup(lookup_from(&[
            ("CODEGRADE_RUN_TIMEOUT_MS", "250"),
            ("CODEGRADE_COMPILE_ONCE", "true"),
            ("CODEGRADE_PARALLEL_TESTS", "1"),
        ]))
        .unwrap();
        assert_eq!(config.run_timeout, Duration::from_millis(250));
        assert!(config.compile_once);
        assert!(config.parallel_tests);
    }

    #[test]
    fn test_missing_languages_file_is_an_error() {
        let result = EvaluatorConfig::from_lookup(lookup_from(&[(
            "CODEGRADE_LANGUAGES_CONFIG",
            "/definitely/not/here/languages.json",
        )]));
        assert!(result.is_err());
    }

    #[test]
    fn test_default_budget() {
        let config = EvaluatorConfig::default();
        assert_eq!(
            config.budget_for(3),
            DEFAULT_RUN_TIMEOUT * 3 + DEFAULT_LOGIC_TIMEOUT + DEFAULT_COMPILE_TIMEOUT
        );
    }
}
