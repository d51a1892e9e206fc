//! Command templates: a command line with positional `%s` placeholders,
//! validated against the declared parameter names before substitution.

use serde::Deserialize;

/// Positional substitution marker inside a command template.
const PLACEHOLDER: &str = "%s";

/// One configured action: the command template plus the ordered names of its
/// positional parameters. Loaded once from configuration and shared
/// read-only across poller and HTTP handler tasks; the names are how the
/// HTTP endpoint maps query parameters into positional order.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommandDefinition {
    /// Command line with zero or more `%s` placeholders.
    #[serde(rename = "command")]
    pub template: String,
    /// Ordered names of the expected positional arguments.
    #[serde(rename = "args", default)]
    pub param_names: Vec<String>,
}

/// Why a set of arguments could not be rendered against a definition.
/// Always a request-level error, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    /// The caller supplied a different number of arguments than the
    /// definition declares.
    #[error("mismatch between command definition args={defined} and number of args={supplied}")]
    ArityMismatch { defined: usize, supplied: usize },
    /// The template's placeholder count disagrees with the declared arity
    /// (a configuration mistake, caught per request).
    #[error("mismatch between placeholders (%s)={placeholders} and number of args={args}")]
    PlaceholderMismatch { placeholders: usize, args: usize },
}

/// Substitute `args` into the definition's template, positionally and in
/// order. Arity is validated against both the declared parameter names and
/// the placeholders literally present in the template before anything is
/// substituted. Whitespace inside an argument value is not quoted; this
/// function guarantees arity correctness only, shell-safety is the caller's
/// concern.
pub fn render(def: &CommandDefinition, args: &[String]) -> Result<String, RenderError> {
    if args.len() != def.param_names.len() {
        return Err(RenderError::ArityMismatch {
            defined: def.param_names.len(),
            supplied: args.len(),
        });
    }

    let placeholders = def.template.matches(PLACEHOLDER).count();
    if placeholders != args.len() {
        return Err(RenderError::PlaceholderMismatch {
            placeholders,
            args: args.len(),
        });
    }

    if args.is_empty() {
        // Zero-argument templates may contain literal `%` characters.
        return Ok(def.template.clone());
    }

    let mut out =
        String::with_capacity(def.template.len() + args.iter().map(String::len).sum::<usize>());
    let mut rest = def.template.as_str();
    for arg in args {
        match rest.split_once(PLACEHOLDER) {
            Some((head, tail)) => {
                out.push_str(head);
                out.push_str(arg);
                rest = tail;
            }
            // Unreachable: the placeholder count equals args.len() here.
            None => break,
        }
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(template: &str, param_names: &[&str]) -> CommandDefinition {
        CommandDefinition {
            template: template.to_string(),
            param_names: param_names.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn no_arguments_returns_template_unmodified() {
        let rendered = render(&def("ls -l", &[]), &[]).expect("render");
        assert_eq!(rendered, "ls -l");
    }

    #[test]
    fn one_argument() {
        let rendered = render(&def("echo %s", &["text"]), &args(&["hello"])).expect("render");
        assert_eq!(rendered, "echo hello");
    }

    #[test]
    fn multiple_arguments_in_order() {
        let rendered = render(
            &def("grep %s %s", &["pattern", "file"]),
            &args(&["search_term", "my_file.txt"]),
        )
        .expect("render");
        assert_eq!(rendered, "grep search_term my_file.txt");
    }

    #[test]
    fn too_few_arguments() {
        let err = render(&def("some_command %s %s", &["arg1", "arg2"]), &args(&["only_one"]))
            .expect_err("expected arity error");
        assert_eq!(
            err.to_string(),
            "mismatch between command definition args=2 and number of args=1"
        );
    }

    #[test]
    fn too_many_arguments() {
        let err = render(&def("another_command %s", &["arg1"]), &args(&["val1", "val2"]))
            .expect_err("expected arity error");
        assert_eq!(
            err.to_string(),
            "mismatch between command definition args=1 and number of args=2"
        );
    }

    #[test]
    fn no_declared_args_but_arguments_supplied() {
        let err = render(&def("uptime", &[]), &args(&["ignored_arg"])).expect_err("expected arity error");
        assert_eq!(
            err.to_string(),
            "mismatch between command definition args=0 and number of args=1"
        );
    }

    #[test]
    fn declared_args_but_none_supplied() {
        let err = render(&def("ping %s", &["host"]), &[]).expect_err("expected arity error");
        assert_eq!(
            err.to_string(),
            "mismatch between command definition args=1 and number of args=0"
        );
    }

    #[test]
    fn template_without_placeholders_but_declared_args() {
        // Arity matches, but the template forgot its placeholder.
        let err = render(&def("fixed_command_with_args", &["placeholder1"]), &args(&["actual_arg1"]))
            .expect_err("expected placeholder error");
        assert_eq!(
            err.to_string(),
            "mismatch between placeholders (%s)=0 and number of args=1"
        );
    }

    #[test]
    fn extra_placeholders_in_template() {
        let err = render(&def("echo Hello %s %s", &["name"]), &args(&["world"]))
            .expect_err("expected placeholder error");
        assert_eq!(
            err.to_string(),
            "mismatch between placeholders (%s)=2 and number of args=1"
        );
    }

    #[test]
    fn whitespace_in_argument_values_is_not_quoted() {
        let rendered = render(&def("echo %s", &["msg"]), &args(&["two words"])).expect("render");
        assert_eq!(rendered, "echo two words");
    }

    #[test]
    fn render_is_idempotent() {
        let d = def("echo Hello %s %s times", &["name", "times"]);
        let a = args(&["world", "2"]);
        let first = render(&d, &a).expect("render");
        let second = render(&d, &a).expect("render");
        assert_eq!(first, second);
        assert_eq!(first, "echo Hello world 2 times");
    }
}
