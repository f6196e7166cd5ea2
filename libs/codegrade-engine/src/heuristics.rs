//! Lexical heuristics: language inference and the local logic score
//!
//! Both are approximate string/pattern matching. They sit behind the
//! `Heuristics` trait so the Aggregator can be given a different strategy
//! (or a fixed fake in tests) without changing.

use codegrade_common::language::SupportedLanguage;
use codegrade_common::types::{Concern, TestCase};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeSet;

/// Result of the deterministic local scoring pass
#[derive(Debug, Clone, PartialEq)]
pub struct LocalScore {
    pub score: f64,
    pub rationale: String,
    pub concerns: BTreeSet<Concern>,
}

pub trait Heuristics: Send + Sync {
    /// Best guess at the language of `code`; `None` when signals are absent
    /// or point at more than one language
    fn infer_language(&self, code: &str) -> Option<SupportedLanguage>;

    /// 0-10 approach score computed without any remote service.
    /// Must never fail.
    fn local_score(&self, code: &str, language: Option<SupportedLanguage>, test_cases: &[TestCase]) -> LocalScore;
}

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap()
}

lazy_static! {
    static ref JAVA_SIGNALS: Vec<Regex> = vec![
        re(r"\bpublic\s+(?:final\s+)?class\s+\w+"),
        re(r"\bpublic\s+static\s+void\s+main\s*\("),
        re(r"\bSystem\.(?:out|err)\.print(?:ln|f)?\s*\("),
        re(r"\bnew\s+Scanner\s*\(\s*System\.in"),
        re(r"(?m)^\s*import\s+java\."),
    ];
    static ref CPP_SIGNALS: Vec<Regex> = vec![
        re(r"#\s*include\s*<(?:iostream|bits/stdc\+\+\.h|vector|string|algorithm|map|set|unordered_map|unordered_set|queue|stack|deque|sstream|fstream|iomanip|utility|numeric|climits|cstdio|cstdlib|cstring|cmath)>"),
        re(r"\busing\s+namespace\s+std\b"),
        re(r"\bstd::"),
        re(r"\b(?:cout|cerr)\s*<<"),
        re(r"\bcin\s*>>"),
        re(r"\btemplate\s*<"),
    ];
    static ref C_SIGNALS: Vec<Regex> = vec![
        re(r"#\s*include\s*<(?:stdio|stdlib|string|math|ctype|stdbool|limits|time|assert)\.h>"),
        re(r"(?:^|[^.\w])printf\s*\("),
        re(r"(?:^|[^.\w])scanf\s*\("),
    ];
    static ref PYTHON_SIGNALS: Vec<Regex> = vec![
        re(r"(?m)^\s*def\s+\w+\s*\([^)]*\)\s*(?:->\s*[^:]+)?:"),
        re(r"(?m)^\s*(?:import\s+[\w.]+(?:\s+as\s+\w+)?(?:\s*,\s*[\w.]+)*\s*$|from\s+[\w.]+\s+import\s+)"),
        re(r"(?:^|[^.\w])print\s*\("),
        re(r"\binput\s*\("),
        re(r"(?m)^\s*(?:elif\b.*|for\s+\w+(?:\s*,\s*\w+)*\s+in\s+.+|while\s+.+|if\s+.+|else\s*):\s*$"),
        re(r"\b(?:True|False|None)\b"),
    ];

    static ref ITERATION: Regex = re(r"\b(?:for|while)\b|\.forEach\s*\(|\bdo\s*\{");
    static ref CONDITIONAL: Regex = re(r"\b(?:if|elif|switch)\b");
    static ref IO_USAGE: Regex = re(
        r"\binput\s*\(|(?:^|[^.\w])print\s*\(|\bprintf\s*\(|\bscanf\s*\(|\bcin\b|\bcout\b|System\.(?:out|in)|\bScanner\b|\bBufferedReader\b|sys\.std(?:in|out)|\bgetline\s*\(|\bputs\s*\(|\bgets\s*\(|\bgetchar\s*\(|\bputchar\s*\("
    );
    static ref READS_INPUT: Regex = re(
        r"\binput\s*\(|\bscanf\s*\(|\bcin\b|System\.in\b|sys\.stdin|\bgetline\s*\(|\bgets\s*\(|\bgetchar\s*\(|\bBufferedReader\b|\bfgets\s*\(|\bopen\s*\(\s*0|\bfscanf\s*\(\s*stdin\b|\bgetc\s*\(\s*stdin\s*\)|\bfread\s*\(|\bread\s*\(\s*(?:0|STDIN_FILENO)\s*,|\bDataInputStream\b|System\.console\s*\(|\bConsole\b"
    );
    static ref DATA_STRUCTURE: Regex = re(
        r"\b(?:list|dict|set|tuple|vector|map|unordered_map|unordered_set|deque|stack|queue|priority_queue|ArrayList|LinkedList|HashMap|HashSet|TreeMap|TreeSet|struct)\b|\[\s*\]|\{\s*\}|\w+\s*\[[^\]\n]*\]\s*[=;]|\[[^\]\n]*\bfor\b"
    );
}

fn signal_count(signals: &[Regex], code: &str) -> usize {
    signals.iter().filter(|r| r.is_match(code)).count()
}

fn is_comment_line(line: &str, language: Option<SupportedLanguage>) -> bool {
    let c_style = line.starts_with("//") || line.starts_with("/*") || line.starts_with('*');
    match language {
        Some(SupportedLanguage::Python) => line.starts_with('#'),
        Some(_) => c_style,
        // `#include`/`#define` are code, other `#` lines are comments
        None => c_style || (line.starts_with('#') && !line.starts_with("#include") && !line.starts_with("#define")),
    }
}

/// Lines that are neither blank nor comments
pub fn code_line_count(code: &str, language: Option<SupportedLanguage>) -> usize {
    code.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !is_comment_line(line, language))
        .count()
}

/// Code that never reads input yet contains every expected output as a
/// literal, for a problem whose tests do supply input
pub fn looks_hard_coded(code: &str, test_cases: &[TestCase]) -> bool {
    let expects_input = test_cases.iter().any(|tc| !tc.input.trim().is_empty());
    let expected: Vec<&str> = test_cases
        .iter()
        .map(|tc| tc.expected.trim())
        .filter(|e| !e.is_empty())
        .collect();

    expects_input && !expected.is_empty() && !READS_INPUT.is_match(code) && expected.iter().all(|e| code.contains(e))
}

/// Default regex-driven strategy
#[derive(Debug, Clone, Copy, Default)]
pub struct LexicalHeuristics;

impl Heuristics for LexicalHeuristics {
    fn infer_language(&self, code: &str) -> Option<SupportedLanguage> {
        let java = signal_count(&JAVA_SIGNALS, code) >= 1;
        let cpp = signal_count(&CPP_SIGNALS, code) >= 1;
        // C++ sources often use C headers and printf; C only counts without C++ signals
        let c = !cpp && signal_count(&C_SIGNALS, code) >= 1;
        let python = signal_count(&PYTHON_SIGNALS, code) >= 2;

        let fired: Vec<SupportedLanguage> = [
            (java, SupportedLanguage::Java),
            (cpp, SupportedLanguage::Cpp),
            (c, SupportedLanguage::C),
            (python, SupportedLanguage::Python),
        ]
        .into_iter()
        .filter_map(|(hit, lang)| hit.then_some(lang))
        .collect();

        match fired.as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }

    fn local_score(&self, code: &str, language: Option<SupportedLanguage>, test_cases: &[TestCase]) -> LocalScore {
        let mut concerns = BTreeSet::new();

        if code.trim().is_empty() {
            return LocalScore {
                score: 0.0,
                rationale: "Local heuristic assessment: empty submission, 0/10.".to_string(),
                concerns,
            };
        }

        let mut score: f64 = 2.0;
        let mut parts = vec!["non-empty code +2".to_string()];

        if ITERATION.is_match(code) {
            score += 2.0;
            parts.push("iteration +2".to_string());
        }
        if CONDITIONAL.is_match(code) {
            score += 2.0;
            parts.push("conditionals +2".to_string());
        }

        let lines = code_line_count(code, language);
        if lines >= 3 {
            score += 2.0;
            parts.push(format!("{} code lines +2", lines));
        } else if lines >= 1 {
            score += 1.0;
            parts.push(format!("{} code line(s) +1", lines));
        }

        if IO_USAGE.is_match(code) {
            score += 1.0;
            parts.push("input/output +1".to_string());
        }
        if DATA_STRUCTURE.is_match(code) {
            score += 1.0;
            parts.push("data structures +1".to_string());
        }

        let score = score.min(10.0);

        let mut rationale = format!(
            "Local heuristic assessment (no AI review available): {} = {}/10.",
            parts.join(", "),
            score
        );

        if looks_hard_coded(code, test_cases) {
            concerns.insert(Concern::HardCoded);
            rationale.push_str(" The code prints expected outputs without reading input; it looks hard-coded.");
        }

        LocalScore {
            score,
            rationale,
            concerns,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JAVA_CODE: &str = r#"
import java.util.Scanner;

public class Main {
    public static void main(String[] args) {
        Scanner sc = new Scanner(System.in);
        int n = sc.nextInt();
        System.out.println(n * 2);
    }
}
"#;

    const CPP_CODE: &str = r#"
#include <iostream>
using namespace std;
int main() {
    int n;
    cin >> n;
    cout << n * 2 << endl;
    return 0;
}
"#;

    const C_CODE: &str = r#"
#include <stdio.h>
int main(void) {
    int n;
    scanf("%d", &n);
    printf("%d\n", n * 2);
    return 0;
}
"#;

    const PYTHON_CODE: &str = r#"
def double(n):
    return n * 2

n = int(input())
print(double(n))
"#;

    #[test]
    fn test_infers_each_language() {
        let h = LexicalHeuristics;
        assert_eq!(h.infer_language(JAVA_CODE), Some(SupportedLanguage::Java));
        assert_eq!(h.infer_language(CPP_CODE), Some(SupportedLanguage::Cpp));
        assert_eq!(h.infer_language(C_CODE), Some(SupportedLanguage::C));
        assert_eq!(h.infer_language(PYTHON_CODE), Some(SupportedLanguage::Python));
    }

    #[test]
    fn test_one_liner_python_is_inferred() {
        assert_eq!(
            LexicalHeuristics.infer_language("print(int(input())*2)"),
            Some(SupportedLanguage::Python)
        );
    }

    #[test]
    fn test_cpp_with_c_headers_is_cpp() {
        let code = "#include <stdio.h>\n#include <vector>\nint main(){ std::vector<int> v; printf(\"%d\", 1); }";
        assert_eq!(LexicalHeuristics.infer_language(code), Some(SupportedLanguage::Cpp));
    }

    #[test]
    fn test_java_printf_is_not_c() {
        let code = "public class A { public static void main(String[] a) { System.out.printf(\"%d\", 1); } }";
        assert_eq!(LexicalHeuristics.infer_language(code), Some(SupportedLanguage::Java));
    }

    #[test]
    fn test_single_python_signal_is_unknown() {
        assert_eq!(LexicalHeuristics.infer_language("x = 1\nprint(x)"), None);
    }

    #[test]
    fn test_no_signals_is_unknown() {
        assert_eq!(LexicalHeuristics.infer_language("x = 1"), None);
        assert_eq!(LexicalHeuristics.infer_language(""), None);
    }

    #[test]
    fn test_mixed_signals_are_ambiguous() {
        let code = format!("{}\n{}", JAVA_CODE, PYTHON_CODE);
        assert_eq!(LexicalHeuristics.infer_language(&code), None);
    }

    #[test]
    fn test_local_score_one_liner() {
        let score = LexicalHeuristics.local_score("print(int(input())*2)", Some(SupportedLanguage::Python), &[]);
        // baseline 2 + one line 1 + io 1
        assert_eq!(score.score, 4.0);
        assert!(score.concerns.is_empty());
    }

    #[test]
    fn test_local_score_full_program_caps_at_ten() {
        let code = r#"
nums = list(map(int, input().split()))
total = 0
for n in nums:
    if n > 0:
        total += n
print(total)
"#;
        let score = LexicalHeuristics.local_score(code, Some(SupportedLanguage::Python), &[]);
        assert_eq!(score.score, 10.0);
        assert!(score.rationale.contains("iteration +2"));
    }

    #[test]
    fn test_local_score_empty_code() {
        let score = LexicalHeuristics.local_score("   \n", None, &[]);
        assert_eq!(score.score, 0.0);
    }

    #[test]
    fn test_comment_only_lines_do_not_count() {
        let code = "# just a comment\n# another\nprint(1)";
        assert_eq!(code_line_count(code, Some(SupportedLanguage::Python)), 1);
        let c = "#include <stdio.h>\n// note\nint main(){}";
        assert_eq!(code_line_count(c, None), 2);
    }

    #[test]
    fn test_hard_coded_detection() {
        let tests = vec![TestCase::new("2\n", "4"), TestCase::new("5\n", "10")];
        assert!(looks_hard_coded("print(4)\nprint(10)", &tests));
        assert!(!looks_hard_coded("print(int(input())*2)", &tests));

        let local = LexicalHeuristics.local_score("print(4)\nprint(10)", Some(SupportedLanguage::Python), &tests);
        assert!(local.concerns.contains(&Concern::HardCoded));
    }

    #[test]
    fn test_alternate_input_readers_are_not_hard_coded() {
        let tests = vec![TestCase::new("2\n", "4")];
        for code in [
            "#include <stdio.h>\nint main(void) { int n; fscanf(stdin, \"%d\", &n); printf(\"%d\\n\", 4); }",
            "#include <stdio.h>\nint main(void) { int c = getc(stdin); puts(\"4\"); }",
            "#include <unistd.h>\nint main(void) { char b[8]; read(0, b, 8); puts(\"4\"); }",
            "#include <stdio.h>\nint main(void) { char b[8]; fread(b, 1, 8, stdin); puts(\"4\"); }",
            "DataInputStream in = new DataInputStream(System.in); System.out.println(4);",
            "String line = System.console().readLine(); System.out.println(4);",
        ] {
            assert!(!looks_hard_coded(code, &tests), "flagged: {}", code);
        }
    }

    #[test]
    fn test_constant_output_problem_is_not_hard_coded() {
        let tests = vec![TestCase::new("", "Hello, World!")];
        assert!(!looks_hard_coded("print(\"Hello, World!\")", &tests));
    }

    #[test]
    fn test_local_score_is_deterministic() {
        let a = LexicalHeuristics.local_score(CPP_CODE, Some(SupportedLanguage::Cpp), &[]);
        let b = LexicalHeuristics.local_score(CPP_CODE, Some(SupportedLanguage::Cpp), &[]);
        assert_eq!(a, b);
    }
}
