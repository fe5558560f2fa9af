//! Grammar registry: file extension → language → grammar handle.
//!
//! Grammars are loaded lazily on first use and cached for the process
//! lifetime; handles are read-only afterwards and freely shared.

use std::path::Path;
use std::sync::OnceLock;

use atlas_core::error::EngineError;

/// Languages the engine can analyze.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lang {
    Js,
    Ts,
    Python,
    C,
    Cpp,
    Rust,
    Go,
    Java,
    CSharp,
    Vba,
    Markdown,
}

impl Lang {
    /// Short language code recorded on file rows and exposed in stats.
    pub fn as_str(&self) -> &'static str {
        match self {
            Lang::Js => "js",
            Lang::Ts => "ts",
            Lang::Python => "py",
            Lang::C => "c",
            Lang::Cpp => "cpp",
            Lang::Rust => "rust",
            Lang::Go => "go",
            Lang::Java => "java",
            Lang::CSharp => "csharp",
            Lang::Vba => "vba",
            Lang::Markdown => "markdown",
        }
    }

    pub fn parse(s: &str) -> Option<Lang> {
        match s {
            "js" => Some(Lang::Js),
            "ts" => Some(Lang::Ts),
            "py" => Some(Lang::Python),
            "c" => Some(Lang::C),
            "cpp" => Some(Lang::Cpp),
            "rust" => Some(Lang::Rust),
            "go" => Some(Lang::Go),
            "java" => Some(Lang::Java),
            "csharp" => Some(Lang::CSharp),
            "vba" => Some(Lang::Vba),
            "markdown" => Some(Lang::Markdown),
            _ => None,
        }
    }
}

impl std::fmt::Display for Lang {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A loaded grammar handle.
///
/// Most languages are backed by a tree-sitter grammar. VBA has no published
/// grammar crate, so its analyzer operates line-based over raw text.
#[derive(Clone)]
pub enum Grammar {
    TreeSitter(tree_sitter::Language),
    Pattern,
}

impl std::fmt::Debug for Grammar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Grammar::TreeSitter(_) => f.write_str("Grammar::TreeSitter"),
            Grammar::Pattern => f.write_str("Grammar::Pattern"),
        }
    }
}

/// Detect the language for a path from its extension.
pub fn detect_language(path: &Path) -> Option<Lang> {
    let ext = path.extension()?.to_str()?;
    match ext {
        "js" | "mjs" | "cjs" | "jsx" => Some(Lang::Js),
        "ts" | "tsx" => Some(Lang::Ts),
        "py" | "pyi" | "pyw" => Some(Lang::Python),
        "c" | "h" => Some(Lang::C),
        "cpp" | "cxx" | "cc" | "hpp" | "hh" => Some(Lang::Cpp),
        "rs" => Some(Lang::Rust),
        "go" => Some(Lang::Go),
        "java" => Some(Lang::Java),
        "cs" => Some(Lang::CSharp),
        "bas" | "vba" | "cls" | "frm" => Some(Lang::Vba),
        "md" | "mdx" => Some(Lang::Markdown),
        _ => None,
    }
}

/// Resolve the grammar handle for a path.
///
/// `.tsx` selects the TSX grammar while the language stays TypeScript.
/// Unknown extensions fail with `UnsupportedLanguage`.
pub fn grammar_for(path: &Path) -> Result<(Lang, Grammar), EngineError> {
    let Some(lang) = detect_language(path) else {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("<none>");
        return Err(EngineError::UnsupportedLanguage(ext.to_string()));
    };

    let grammar = match lang {
        Lang::Js => Grammar::TreeSitter(javascript()),
        Lang::Ts => {
            if path.extension().and_then(|e| e.to_str()) == Some("tsx") {
                Grammar::TreeSitter(tsx())
            } else {
                Grammar::TreeSitter(typescript())
            }
        }
        Lang::Python => Grammar::TreeSitter(python()),
        Lang::C => Grammar::TreeSitter(c()),
        Lang::Cpp => Grammar::TreeSitter(cpp()),
        Lang::Rust => Grammar::TreeSitter(rust()),
        Lang::Go => Grammar::TreeSitter(go()),
        Lang::Java => Grammar::TreeSitter(java()),
        Lang::CSharp => Grammar::TreeSitter(csharp()),
        Lang::Vba => Grammar::Pattern,
        Lang::Markdown => Grammar::TreeSitter(markdown()),
    };
    Ok((lang, grammar))
}

fn javascript() -> tree_sitter::Language {
    static LANG: OnceLock<tree_sitter::Language> = OnceLock::new();
    LANG.get_or_init(|| tree_sitter_javascript::LANGUAGE.into())
        .clone()
}

fn typescript() -> tree_sitter::Language {
    static LANG: OnceLock<tree_sitter::Language> = OnceLock::new();
    LANG.get_or_init(|| tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into())
        .clone()
}

fn tsx() -> tree_sitter::Language {
    static LANG: OnceLock<tree_sitter::Language> = OnceLock::new();
    LANG.get_or_init(|| tree_sitter_typescript::LANGUAGE_TSX.into())
        .clone()
}

fn python() -> tree_sitter::Language {
    static LANG: OnceLock<tree_sitter::Language> = OnceLock::new();
    LANG.get_or_init(|| tree_sitter_python::LANGUAGE.into())
        .clone()
}

fn c() -> tree_sitter::Language {
    static LANG: OnceLock<tree_sitter::Language> = OnceLock::new();
    LANG.get_or_init(|| tree_sitter_c::LANGUAGE.into()).clone()
}

fn cpp() -> tree_sitter::Language {
    static LANG: OnceLock<tree_sitter::Language> = OnceLock::new();
    LANG.get_or_init(|| tree_sitter_cpp::LANGUAGE.into()).clone()
}

fn rust() -> tree_sitter::Language {
    static LANG: OnceLock<tree_sitter::Language> = OnceLock::new();
    LANG.get_or_init(|| tree_sitter_rust::LANGUAGE.into())
        .clone()
}

fn go() -> tree_sitter::Language {
    static LANG: OnceLock<tree_sitter::Language> = OnceLock::new();
    LANG.get_or_init(|| tree_sitter_go::LANGUAGE.into()).clone()
}

fn java() -> tree_sitter::Language {
    static LANG: OnceLock<tree_sitter::Language> = OnceLock::new();
    LANG.get_or_init(|| tree_sitter_java::LANGUAGE.into())
        .clone()
}

fn csharp() -> tree_sitter::Language {
    static LANG: OnceLock<tree_sitter::Language> = OnceLock::new();
    LANG.get_or_init(|| tree_sitter_c_sharp::LANGUAGE.into())
        .clone()
}

fn markdown() -> tree_sitter::Language {
    static LANG: OnceLock<tree_sitter::Language> = OnceLock::new();
    LANG.get_or_init(|| tree_sitter_md::LANGUAGE.into()).clone()
}
