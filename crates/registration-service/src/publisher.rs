//! Public page synthesis for registered items

use std::sync::Arc;

use tagpage_common::{escape_html, Error, Result};
use tracing::error;

use crate::pages::{NewPage, PageMetadata, PageStore, PublishedPage, QR_TEMPLATE};

/// Everything a registration page shows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageContent {
    pub display_name: String,
    pub image_url: Option<String>,
    pub free_text: String,
    pub dial_ref: String,
    pub serial_number: String,
}

/// Title and body of a page, ready to store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    pub title: String,
    pub body: String,
}

/// Where a page came from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageOrigin {
    pub order_id: Option<u64>,
    pub item_id: Option<u64>,
}

/// Page id and public address of a published page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedRef {
    pub page_id: u64,
    pub url: String,
}

const CONTACT_BUTTON_STYLE: &str = "padding: 24px; background-color: #dc2626; color: white; text-decoration: none; border-radius: 6px; font-size: 16px; font-weight: bold;";
const MAPS_BUTTON_STYLE: &str = "padding: 24px; background-color: #16a34a; color: white; text-decoration: none; border-radius: 6px; font-size: 16px; font-weight: bold;";
const BUTTON_ROW_STYLE: &str =
    "margin-top: 30px; padding-top: 30px; display: flex; flex-wrap: wrap; gap: 15px;";

/// Render the title and body HTML of a registration page
pub fn render_page(content: &PageContent) -> RenderedPage {
    let image_html = match content.image_url.as_deref().filter(|u| !u.is_empty()) {
        Some(url) => format!(
            r#"<img src="{}" style="float:right; margin:0 0 20px 20px; max-width:300px;">"#,
            escape_html(url)
        ),
        None => "<p>No image uploaded.</p>".to_string(),
    };

    let free_text = escape_html(&content.free_text).replace('\n', "<br>\n");

    let body = format!(
        r##"<h1>{name}</h1>
{image}
<p>{text}</p>
<div style="clear: both;">&nbsp;</div>
<div style="{row}">
    <a href="{tel}" style="{contact}">📞 Contact</a>
</div>
<div style="{row}">
    <a href="#" id="open-maps-btn" style="{maps}">🚓 Find the Nearest Authorities</a>
</div>
"##,
        name = escape_html(&content.display_name),
        image = image_html,
        text = free_text,
        row = BUTTON_ROW_STYLE,
        tel = escape_html(&content.dial_ref),
        contact = CONTACT_BUTTON_STYLE,
        maps = MAPS_BUTTON_STYLE,
    );

    RenderedPage {
        title: content.serial_number.clone(),
        body,
    }
}

/// Wrap a stored page into a complete HTML document
pub fn render_document(page: &PublishedPage) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title}</title>
</head>
<body class="template-{template}">
{body}
</body>
</html>
"#,
        title = escape_html(&page.title),
        template = escape_html(&page.metadata.template),
        body = page.body,
    )
}

/// Publishes registration pages
#[derive(Clone)]
pub struct Publisher {
    pages: Arc<dyn PageStore>,
    base_url: String,
}

impl Publisher {
    pub fn new(pages: Arc<dyn PageStore>, public_base_url: &str) -> Self {
        Self {
            pages,
            base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Public URL of a page
    pub fn url(&self, page_id: u64) -> String {
        format!("{}/pages/{}", self.base_url, page_id)
    }

    /// Render and publish a page owned by `owner_user_id`
    pub async fn publish(
        &self,
        content: &PageContent,
        owner_user_id: u64,
        origin: PageOrigin,
    ) -> Result<PublishedRef> {
        let rendered = render_page(content);

        let page = NewPage {
            title: rendered.title,
            body: rendered.body,
            owner_user_id,
            metadata: PageMetadata {
                template: QR_TEMPLATE.to_string(),
                generated: true,
                locked: true,
                registered_user_id: owner_user_id,
                serial_number: content.serial_number.clone(),
                order_id: origin.order_id,
                item_id: origin.item_id,
            },
        };

        let created = self.pages.create(page).await.map_err(|e| {
            error!(
                "Failed to create page for serial {}: {}",
                content.serial_number, e
            );
            Error::PageCreationFailed(e.to_string())
        })?;

        Ok(PublishedRef {
            page_id: created.id,
            url: self.url(created.id),
        })
    }
}
