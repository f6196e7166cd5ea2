//! Integration tests against real host toolchains
//!
//! These verify the built-in recipes end to end:
//! 1. Every language can echo stdin back and pass
//! 2. Compile errors carry the compiler's diagnostics
//! 3. Runtime errors and timeouts are detected
//! 4. The documented python example scores as expected
//!
//! They need python3, gcc, g++ and a JDK on PATH, so they are ignored by
//! default. Run with `cargo test -p codegrade-engine -- --ignored`.

#[cfg(test)]
mod toolchain_tests {
    use crate::config::EvaluatorConfig;
    use crate::executor::evaluate_submission;
    use crate::runner::Runner;
    use codegrade_common::types::{Outcome, TestCase};

    fn runner() -> Runner {
        Runner::from_config(&EvaluatorConfig::default())
    }

    const ECHO_PYTHON: &str = "print(input())";

    const ECHO_C: &str = r#"
#include <stdio.h>
int main(void) {
    char line[256];
    if (fgets(line, sizeof line, stdin)) printf("%s", line);
    return 0;
}
"#;

    const ECHO_CPP: &str = r#"
#include <iostream>
#include <string>
int main() {
    std::string line;
    std::getline(std::cin, line);
    std::cout << line << std::endl;
    return 0;
}
"#;

    const ECHO_JAVA: &str = r#"
import java.util.Scanner;

public class Echo {
    public static void main(String[] args) {
        Scanner sc = new Scanner(System.in);
        System.out.println(sc.nextLine());
    }
}
"#;

    #[tokio::test]
    #[ignore] // Requires python3, gcc, g++ and javac
    async fn test_echo_in_every_language() {
        let echo = TestCase::new("5\n", "5");
        for (language, code) in [("python", ECHO_PYTHON), ("c", ECHO_C), ("c++", ECHO_CPP), ("java", ECHO_JAVA)] {
            let report = evaluate_submission(&EvaluatorConfig::default(), code, language, &[echo.clone()]).await;
            assert!(report.per_test_results[0].matched, "{} echo failed: {:?}", language, report.per_test_results[0]);
        }
    }

    #[tokio::test]
    #[ignore] // Requires python3
    async fn test_documented_python_example() {
        let tests = vec![TestCase::new("2\n", "4"), TestCase::new("5\n", "10")];
        let report = evaluate_submission(&EvaluatorConfig::default(), "print(int(input())*2)", "python", &tests).await;

        assert_eq!(report.test_case_score, 100.0);
        assert_eq!(report.logic_score, Some(4.0));
        assert_eq!(report.combined_score, 70.0);
        assert!(report.per_test_results.iter().all(|r| r.matched));
    }

    #[tokio::test]
    #[ignore] // Requires gcc
    async fn test_c_compile_error_keeps_diagnostics() {
        let result = runner().execute("int main( { return 0; }", "c", "").await;
        assert_eq!(result.outcome, Outcome::CompileError);
        assert!(result.stderr.contains("error"));
    }

    #[tokio::test]
    #[ignore] // Requires python3
    async fn test_python_runtime_error() {
        let result = runner().execute("raise ValueError('boom')", "python", "").await;
        assert_eq!(result.outcome, Outcome::RuntimeError);
        assert!(result.stderr.contains("ValueError"));
    }

    #[tokio::test]
    #[ignore] // Requires gcc
    async fn test_c_infinite_loop_times_out() {
        let result = runner().execute("int main(void) { for (;;) {} }", "c", "").await;
        assert_eq!(result.outcome, Outcome::Timeout);
        assert!(result.stdout.is_empty());
    }

    #[tokio::test]
    #[ignore] // Requires javac
    async fn test_java_file_named_after_public_class() {
        let result = runner().execute(ECHO_JAVA, "java", "hello\n").await;
        assert_eq!(result.outcome, Outcome::Success);
        assert_eq!(result.stdout, "hello");
    }

    #[tokio::test]
    #[ignore] // Requires javac
    async fn test_java_helper_class_before_main() {
        let code = r#"
import java.util.*;
class Node { int v; }
class Main {
    public static void main(String[] a) {
        Scanner s = new Scanner(System.in);
        System.out.println(s.nextInt() * 2);
    }
}
"#;
        let report =
            evaluate_submission(&EvaluatorConfig::default(), code, "java", &[TestCase::new("2\n", "4")]).await;
        assert!(report.per_test_results[0].matched, "{:?}", report.per_test_results[0]);
    }

    #[tokio::test]
    #[ignore] // Requires gcc
    async fn test_c_void_main_still_matches() {
        let code = "#include <stdio.h>\nvoid main() { int n; scanf(\"%d\", &n); printf(\"%d\\n\", n * 2); }";
        let report = evaluate_submission(&EvaluatorConfig::default(), code, "c", &[TestCase::new("2\n", "4")]).await;
        assert!(report.per_test_results[0].matched, "{:?}", report.per_test_results[0]);
    }
}
