//! Prompt registry (spec §4.11): a fixed set of versioned, templated prompts.
//! If an argument names a model URI, the handler fetches the compiled model
//! and injects its definition into the template variables before rendering —
//! templates themselves use a minimal `{{var}}` substitution rather than a
//! full Handlebars engine, since the argument sets are small and fixed.

use std::collections::HashMap;

use serde_json::json;

use crate::error::AppError;
use crate::state::AppState;

use super::uri::MalloyUri;

pub struct PromptDefinition {
    pub id: &'static str,
    pub version: &'static str,
    pub arguments: &'static [&'static str],
    template: &'static str,
}

pub fn registry() -> Vec<PromptDefinition> {
    vec![
        PromptDefinition {
            id: "explain-malloy-query",
            version: "1.0.0",
            arguments: &["modelUri"],
            template: "Explain what this Malloy model computes:\n{{modelDefinition}}",
        },
        PromptDefinition {
            id: "generate-malloy-query-from-description",
            version: "1.0.0",
            arguments: &["modelUri", "description"],
            template: "Given this model:\n{{modelDefinition}}\n\nWrite a Malloy query that: {{description}}",
        },
        PromptDefinition {
            id: "translate-sql-to-malloy",
            version: "1.0.0",
            arguments: &["sql"],
            template: "Translate the following SQL into an equivalent Malloy query:\n{{sql}}",
        },
        PromptDefinition {
            id: "summarize-malloy-model",
            version: "1.0.0",
            arguments: &["modelUri"],
            template: "Summarize the sources and queries exposed by this model:\n{{modelDefinition}}",
        },
    ]
}

pub fn versioned_id(def: &PromptDefinition) -> String {
    format!("{}@{}", def.id, def.version)
}

pub async fn render(
    state: &AppState,
    prompt_id: &str,
    arguments: &HashMap<String, String>,
) -> Result<String, AppError> {
    let registry = registry();
    let (base_id, version) = prompt_id
        .split_once('@')
        .ok_or_else(|| AppError::bad_request(format!("malformed prompt id: {prompt_id}")))?;
    let def = registry
        .iter()
        .find(|d| d.id == base_id && d.version == version)
        .ok_or_else(|| AppError::bad_request(format!("unknown prompt: {prompt_id}")))?;

    let mut variables: HashMap<String, String> = arguments.clone();

    if let Some(model_uri) = arguments.get("modelUri") {
        let parsed = MalloyUri::parse(model_uri)?;
        if let MalloyUri::Model {
            project,
            package,
            model_path,
        } = parsed
        {
            let handle = state.store.project_handle(&project).await?;
            let guard = handle.lock().await;
            let pkg = guard.get_package(&package)?;
            let model = pkg.get_model(&model_path)?;
            let compiled = model.compiled(state.runtime.as_ref()).await?;
            variables.insert(
                "modelDefinition".to_string(),
                json!({ "sources": compiled.sources, "queries": compiled.queries }).to_string(),
            );
        }
    }

    Ok(render_template(def.template, &variables))
}

fn render_template(template: &str, variables: &HashMap<String, String>) -> String {
    let mut out = template.to_string();
    for (key, value) in variables {
        out = out.replace(&format!("{{{{{key}}}}}"), value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_has_four_versioned_prompts() {
        let defs = registry();
        assert_eq!(defs.len(), 4);
        assert_eq!(versioned_id(&defs[0]), "explain-malloy-query@1.0.0");
    }

    #[test]
    fn template_substitutes_plain_variables() {
        let mut vars = HashMap::new();
        vars.insert("sql".to_string(), "SELECT 1".to_string());
        let rendered = render_template("Translate: {{sql}}", &vars);
        assert_eq!(rendered, "Translate: SELECT 1");
    }
}
