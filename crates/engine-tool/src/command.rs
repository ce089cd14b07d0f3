//! Command Builder: render an interface's command templates against
//! resolved values, using `handlebars::Handlebars` for `{{field}}`
//! substitution.

use engine_core::resolver::ResolvedValues;

/// Render every template in `templates` against `values`, dropping any
/// render that comes out empty and preserving the order of the rest.
pub fn render_command(templates: &[String], values: &ResolvedValues) -> Result<Vec<String>, String> {
    let mut registry = handlebars::Handlebars::new();
    registry.register_escape_fn(handlebars::no_escape);
    let data = serde_json::Value::Object(
        values
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    );

    let mut argv = Vec::with_capacity(templates.len());
    for template in templates {
        let rendered = registry
            .render_template(template, &data)
            .map_err(|e| format!("rendering {template:?}: {e}"))?;
        if !rendered.is_empty() {
            argv.push(rendered);
        }
    }
    Ok(argv)
}
