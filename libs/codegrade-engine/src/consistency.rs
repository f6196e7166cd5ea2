//! Language consistency check
//!
//! Runs before any compile or execution. A submission whose source is
//! confidently recognised as a different language than the declared one is
//! rejected without touching a toolchain.

use crate::heuristics::Heuristics;
use codegrade_common::language::SupportedLanguage;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Language mismatch: the submission was declared as {declared} but the code looks like {inferred}. Please select {inferred} or submit {declared} code.")]
pub struct MismatchError {
    pub declared: &'static str,
    pub inferred: &'static str,
}

/// C code is valid C++ source, so a C-looking submission declared as C++
/// is accepted. Every other disagreement is a mismatch.
fn compatible(declared: SupportedLanguage, inferred: SupportedLanguage) -> bool {
    declared == inferred || (declared == SupportedLanguage::Cpp && inferred == SupportedLanguage::C)
}

pub fn check(code: &str, declared: SupportedLanguage, heuristics: &dyn Heuristics) -> Result<(), MismatchError> {
    match heuristics.infer_language(code) {
        Some(inferred) if !compatible(declared, inferred) => Err(MismatchError {
            declared: declared.display_name(),
            inferred: inferred.display_name(),
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heuristics::LexicalHeuristics;

    const JAVA_CODE: &str = "public class Main { public static void main(String[] a) { System.out.println(1); } }";

    #[test]
    fn test_java_declared_as_python_is_rejected() {
        let err = check(JAVA_CODE, SupportedLanguage::Python, &LexicalHeuristics).unwrap_err();
        assert_eq!(err.declared, "Python");
        assert_eq!(err.inferred, "Java");
        let msg = err.to_string();
        assert!(msg.contains("Python"));
        assert!(msg.contains("Java"));
    }

    #[test]
    fn test_matching_language_passes() {
        assert!(check(JAVA_CODE, SupportedLanguage::Java, &LexicalHeuristics).is_ok());
    }

    #[test]
    fn test_unknown_inference_passes() {
        assert!(check("x = 1", SupportedLanguage::Java, &LexicalHeuristics).is_ok());
        assert!(check("", SupportedLanguage::C, &LexicalHeuristics).is_ok());
    }

    #[test]
    fn test_c_code_declared_as_cpp_passes() {
        let c = "#include <stdio.h>\nint main(){ printf(\"hi\"); }";
        assert!(check(c, SupportedLanguage::Cpp, &LexicalHeuristics).is_ok());
        assert!(check(c, SupportedLanguage::Python, &LexicalHeuristics).is_err());
    }
}
