//! Handlebars registry with every page compiled in.

use handlebars::Handlebars;

use crate::error::Result;

const PARTIALS: [(&str, &str); 3] = [
    ("header", include_str!("templates/header.hbs")),
    ("footer", include_str!("templates/footer.hbs")),
    ("table", include_str!("templates/table.hbs")),
];

const PAGES: [(&str, &str); 16] = [
    ("home", include_str!("templates/home.hbs")),
    ("register", include_str!("templates/register.hbs")),
    ("login", include_str!("templates/login.hbs")),
    ("profile", include_str!("templates/profile.hbs")),
    ("edit_profile", include_str!("templates/edit_profile.hbs")),
    ("upload", include_str!("templates/upload.hbs")),
    ("files", include_str!("templates/files.hbs")),
    ("summary", include_str!("templates/summary.hbs")),
    ("details", include_str!("templates/details.hbs")),
    ("route_analysis", include_str!("templates/route_analysis.hbs")),
    ("cost_analysis", include_str!("templates/cost_analysis.hbs")),
    ("raw_data", include_str!("templates/raw_data.hbs")),
    ("route_files", include_str!("templates/route_files.hbs")),
    ("route_costs", include_str!("templates/route_costs.hbs")),
    ("report", include_str!("templates/report.hbs")),
    ("not_found", include_str!("templates/not_found.hbs")),
];

/// Build the registry. Fails if any template does not parse.
pub fn registry() -> Result<Handlebars<'static>> {
    let mut handlebars = Handlebars::new();
    handlebars.set_strict_mode(false);

    for (name, source) in PARTIALS {
        handlebars.register_partial(name, source)?;
    }
    for (name, source) in PAGES {
        handlebars.register_template_string(name, source)?;
    }
    Ok(handlebars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flash::Flash;
    use crate::views::{Page, Shell, TableView};
    use serde_json::json;

    #[test]
    fn all_templates_parse() {
        let registry = registry().unwrap();
        for (name, _) in PAGES {
            assert!(registry.has_template(name), "{} missing", name);
        }
    }

    #[test]
    fn shell_renders_messages_escaped() {
        let registry = registry().unwrap();
        let page = Page {
            shell: Shell::new("Home", None, &[], vec![Flash::danger("<b>Login required.</b>")]),
            page: json!({}),
        };
        let html = registry.render("home", &page).unwrap();
        assert!(html.contains("alert-danger"));
        assert!(html.contains("&lt;b&gt;Login required.&lt;/b&gt;"));
        assert!(html.contains("<title>Home"));
        assert!(html.contains(r#"<link rel="icon" href="/static/favicon.svg""#));
    }

    #[test]
    fn table_partial_renders_rows() {
        let registry = registry().unwrap();
        let page = Page {
            shell: Shell::default(),
            page: json!({
                "file_id": 1,
                "file_name": "a.xlsx",
                "empty_message": "No summary data available",
                "table": TableView {
                    headers: vec!["Row Labels".into()],
                    rows: vec![vec!["Fuel".into()]],
                },
            }),
        };
        let html = registry.render("summary", &page).unwrap();
        assert!(html.contains("<th>Row Labels</th>"));
        assert!(html.contains("<td>Fuel</td>"));
        assert!(!html.contains("No summary data available"));
    }
}
