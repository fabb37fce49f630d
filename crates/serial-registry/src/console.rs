//! HTML rendering for the operator console

use tagpage_common::escape_html;

use crate::models::SerialRecord;

/// Submit marker the add form posts alongside its fields
pub const ADD_SERIAL_MARKER: &str = "add_serial";

/// Anti-forgery action name of the add form
pub const ADD_SERIAL_ACTION: &str = "add_serial";

/// Banner shown above the form
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Banner {
    Added,
    Duplicate,
    Invalid,
}

impl Banner {
    pub fn from_query(added: Option<&str>, error: Option<&str>) -> Option<Self> {
        match (added, error) {
            (_, Some("duplicate")) => Some(Banner::Duplicate),
            (_, Some(_)) => Some(Banner::Invalid),
            (Some("1"), None) => Some(Banner::Added),
            _ => None,
        }
    }

    fn html(&self) -> &'static str {
        match self {
            Banner::Added => {
                r#"<div class="notice notice-success"><p>Serial number added.</p></div>"#
            }
            Banner::Duplicate => {
                r#"<div class="notice notice-error"><p>That serial number already exists.</p></div>"#
            }
            Banner::Invalid => {
                r#"<div class="notice notice-error"><p>Please enter a serial number and a valid product.</p></div>"#
            }
        }
    }
}

/// Next-available preview of one product
#[derive(Debug, Clone)]
pub struct ProductPreview {
    pub product_id: u64,
    pub next_unused: Option<SerialRecord>,
}

/// Everything the console page shows
#[derive(Debug, Clone)]
pub struct ConsoleView {
    pub token: String,
    pub banner: Option<Banner>,
    pub previews: Vec<ProductPreview>,
}

pub fn render_console(view: &ConsoleView) -> String {
    let banner = view.banner.as_ref().map(Banner::html).unwrap_or_default();

    let rows: String = view
        .previews
        .iter()
        .map(|p| {
            let next = p
                .next_unused
                .as_ref()
                .map(|r| escape_html(&r.serial_number))
                .unwrap_or_default();
            let placeholder = if p.next_unused.is_none() {
                r#" placeholder="No unused serials""#
            } else {
                ""
            };
            format!(
                r#"<tr><th scope="row">Product {id}</th><td><input type="text" name="next_serial_{id}" value="{next}"{placeholder} readonly></td></tr>"#,
                id = p.product_id,
                next = next,
                placeholder = placeholder,
            )
        })
        .collect();

    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Serial Numbers</title></head>
<body>
<div class="wrap">
<h1>Serial Numbers</h1>
{banner}
<h2>Add Serial Number</h2>
<form method="post" action="/admin/serials">
<input type="hidden" name="_token" value="{token}">
<p><label>Serial Number:<br><input type="text" name="serial_number" required></label></p>
<p><label>Product ID:<br><input type="number" name="item_no" min="1" required></label></p>
<p><button type="submit" name="{marker}" value="1">Add Serial Number</button></p>
</form>
<h2>Next Available Serial</h2>
<form method="get" action="/admin/serials">
<p><label>Product ID: <input type="number" name="product" min="1"></label> <button type="submit">Preview</button></p>
</form>
<table class="form-table">
{rows}
</table>
</div>
</body>
</html>
"#,
        banner = banner,
        token = escape_html(&view.token),
        marker = ADD_SERIAL_MARKER,
        rows = rows,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_banner_from_query() {
        assert_eq!(Banner::from_query(Some("1"), None), Some(Banner::Added));
        assert_eq!(
            Banner::from_query(None, Some("duplicate")),
            Some(Banner::Duplicate)
        );
        assert_eq!(Banner::from_query(None, Some("invalid")), Some(Banner::Invalid));
        assert_eq!(Banner::from_query(None, None), None);
    }

    #[test]
    fn test_render_preview_is_read_only() {
        let view = ConsoleView {
            token: "abc123".to_string(),
            banner: None,
            previews: vec![
                ProductPreview {
                    product_id: 42,
                    next_unused: Some(SerialRecord::new(1, "SN-<100>".to_string(), 42, false)),
                },
                ProductPreview {
                    product_id: 7,
                    next_unused: None,
                },
            ],
        };

        let html = render_console(&view);
        assert!(html.contains(r#"name="next_serial_42" value="SN-&lt;100&gt;" readonly"#));
        assert!(html.contains(r#"placeholder="No unused serials" readonly"#));
        assert!(html.contains(r#"name="_token" value="abc123""#));
    }
}
