use std::path::Path;

use tera::Tera;

use crate::config::{CRON_ASTERISK_LOOKALIKE, FAILURE_TEMPLATE, SUCCESS_TEMPLATE};

const DEFAULT_SUCCESS_TEMPLATE: &str = include_str!("../templates/slack-success.json");
const DEFAULT_FAILURE_TEMPLATE: &str = include_str!("../templates/slack-failure.json");

/// Initialize the Tera template engine with the Slack message templates.
///
/// Templates found in `override_dir` replace the built-in ones of the same name.
pub fn init_templates(override_dir: Option<&Path>) -> Result<Tera, tera::Error> {
    let mut tera = Tera::default();

    for (name, builtin) in [
        (SUCCESS_TEMPLATE, DEFAULT_SUCCESS_TEMPLATE),
        (FAILURE_TEMPLATE, DEFAULT_FAILURE_TEMPLATE),
    ] {
        match override_dir.map(|dir| dir.join(name)).filter(|p| p.is_file()) {
            Some(path) => {
                tracing::debug!(template = name, path = %path.display(), "Using template override");
                tera.add_template_file(&path, Some(name))?;
            }
            None => tera.add_raw_template(name, builtin)?,
        }
    }

    tera.register_filter("lookalike_asterisks", lookalike_asterisks_filter);

    Ok(tera)
}

/// Replace `*` with a look-alike so cron expressions don't turn bold in Slack
fn lookalike_asterisks_filter(
    value: &tera::Value,
    _args: &std::collections::HashMap<String, tera::Value>,
) -> tera::Result<tera::Value> {
    let s = value
        .as_str()
        .ok_or_else(|| tera::Error::msg("lookalike_asterisks filter expects a string"))?;

    Ok(tera::Value::String(s.replace('*', &CRON_ASTERISK_LOOKALIKE.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> tera::Context {
        let mut context = tera::Context::new();
        for (key, value) in [
            ("environment", "qa"),
            ("channel", "#void"),
            ("emoji", "taco"),
            ("name", "fugazi \"quoted\""),
            ("url", "https://fugazi.com/velocipastor"),
            ("statusCode", "419"),
            ("note", "wow this is the greatest"),
            ("product", "fugazi"),
            ("version", "1.0.0"),
            ("cron", "0 0 * * *"),
            ("deploymentId", "1-fugazi-1-0-0-oicu812"),
        ] {
            context.insert(key, value);
        }
        context
    }

    #[test]
    fn test_lookalike_asterisks_filter() {
        let out = lookalike_asterisks_filter(
            &tera::Value::String("*/5 * * * *".to_string()),
            &Default::default(),
        )
        .unwrap();
        assert_eq!(out, tera::Value::String("＊/5 ＊ ＊ ＊ ＊".to_string()));
    }

    #[test]
    fn test_lookalike_asterisks_filter_rejects_non_strings() {
        assert!(lookalike_asterisks_filter(&tera::Value::Bool(true), &Default::default()).is_err());
    }

    #[test]
    fn test_builtin_templates_render_valid_json() {
        let tera = init_templates(None).unwrap();
        for name in [SUCCESS_TEMPLATE, FAILURE_TEMPLATE] {
            let rendered = tera.render(name, &context()).unwrap();
            let json: serde_json::Value = serde_json::from_str(&rendered)
                .unwrap_or_else(|e| panic!("{} is not JSON: {}\n{}", name, e, rendered));
            assert_eq!(json["channel"], "#void");
            assert!(rendered.contains("fugazi \\\"quoted\\\""));
            assert!(rendered.contains("0 0 ＊ ＊ ＊"));
            assert!(!rendered.contains("* * *"));
            assert!(rendered.contains("1-fugazi-1-0-0-oicu812"));
        }
    }

    #[test]
    fn test_override_directory_replaces_template() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(FAILURE_TEMPLATE),
            r#"{"channel": {{ channel | json_encode() }}, "text": "custom {{ statusCode }}"}"#,
        )
        .unwrap();

        let tera = init_templates(Some(dir.path())).unwrap();
        let failure = tera.render(FAILURE_TEMPLATE, &context()).unwrap();
        assert_eq!(failure, r##"{"channel": "#void", "text": "custom 419"}"##);

        // Success template still the built-in one
        let success = tera.render(SUCCESS_TEMPLATE, &context()).unwrap();
        assert!(success.contains(":taco:"));
    }
}
