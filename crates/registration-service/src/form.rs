//! HTML rendering for the registration forms

use tagpage_common::escape_html;

use crate::notices::{Notice, NoticeKind};
use crate::orders::ItemRegistration;
use crate::registration::MANUAL_ORDER_ID;

/// Submit marker every registration form posts
pub const SUBMIT_MARKER: &str = "gds_submit_registration";

/// Where registration forms are posted
pub const REGISTER_PATH: &str = "/register";

/// One line item's form
#[derive(Debug, Clone)]
pub struct ItemForm {
    pub order_id: u64,
    pub item_id: u64,
    pub product_name: String,
    pub token: String,
    pub registration: ItemRegistration,

    /// URL of the currently stored customer image
    pub image_url: Option<String>,

    /// URL of the page already published for this item
    pub page_url: Option<String>,
}

fn notice_html(notice: Option<&Notice>) -> String {
    let Some(notice) = notice else {
        return String::new();
    };
    let class = match notice.kind {
        NoticeKind::Success => "notice-success",
        NoticeKind::Error => "notice-error",
    };
    format!(
        r#"<div class="notice {}"><p>{}</p></div>"#,
        class,
        escape_html(&notice.message)
    )
}

fn document(title: &str, content: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>{title}</title></head>
<body>
{content}
</body>
</html>
"#,
        title = escape_html(title),
        content = content,
    )
}

fn field_value(value: &Option<String>) -> String {
    escape_html(value.as_deref().unwrap_or_default())
}

fn render_item(form: &ItemForm) -> String {
    let reg = &form.registration;

    let current_image = match &form.image_url {
        Some(url) => format!(
            r#"<p>Current image:<br><img src="{}" style="max-width:150px;"></p>"#,
            escape_html(url)
        ),
        None => String::new(),
    };
    let current_page = match &form.page_url {
        Some(url) => format!(
            r#"<p>Your page: <a href="{url}">{url}</a></p>"#,
            url = escape_html(url)
        ),
        None => String::new(),
    };

    format!(
        r#"<div class="gds-registration">
<h3>Register {product}</h3>
{current_page}<form method="post" action="{action}" enctype="multipart/form-data">
<input type="hidden" name="gds_item_id" value="{item_id}">
<input type="hidden" name="gds_order_id" value="{order_id}">
<input type="hidden" name="gds_nonce" value="{token}">
<p><label>Name:<br><input type="text" name="gds_name" value="{name}" required></label></p>
<p><label>Phone:<br><input type="text" name="gds_phone" value="{phone}" required></label></p>
<p><label>Vital Info:<br><textarea name="gds_vital_info" required>{vital}</textarea></label></p>
<p><label>Upload Image:<br><input type="file" name="gds_image" accept="image/jpeg,image/png,image/gif"></label></p>
{current_image}<p><label>Enter Serial Number:<br><input type="text" name="gds_serial" value="{serial}" required></label></p>
<p><button type="submit" name="{marker}" value="1">Submit Registration</button></p>
</form>
</div>
"#,
        product = escape_html(&form.product_name),
        current_page = current_page,
        action = REGISTER_PATH,
        item_id = form.item_id,
        order_id = form.order_id,
        token = escape_html(&form.token),
        name = field_value(&reg.customer_name),
        phone = field_value(&reg.phone_number),
        vital = field_value(&reg.vital_information),
        current_image = current_image,
        serial = field_value(&reg.serial_number),
        marker = SUBMIT_MARKER,
    )
}

/// Registration page of an order: one form per line item
pub fn render_order_forms(order_id: u64, notice: Option<&Notice>, items: &[ItemForm]) -> String {
    let forms: String = items.iter().map(render_item).collect();
    let content = format!(
        "<h2>Register your items for order #{}</h2>\n{}\n{}",
        order_id,
        notice_html(notice),
        forms
    );
    document("Item Registration", &content)
}

/// Operator form that registers a serial without an order
pub fn render_manual_form(error: Option<&str>) -> String {
    let notice = error.map(Notice::error);
    let content = format!(
        r#"<h2>Manual Registration</h2>
{notice}
<form method="post" action="{action}" enctype="multipart/form-data">
<input type="hidden" name="gds_item_id" value="0">
<input type="hidden" name="gds_order_id" value="{manual}">
<p><label>Name:<br><input type="text" name="gds_name" required></label></p>
<p><label>Phone:<br><input type="text" name="gds_phone" required></label></p>
<p><label>Vital Info:<br><textarea name="gds_vital_info" required></textarea></label></p>
<p><label>Upload Image:<br><input type="file" name="gds_image" accept="image/jpeg,image/png,image/gif"></label></p>
<p><label>Enter Serial Number:<br><input type="text" name="gds_serial" required></label></p>
<p><button type="submit" name="{marker}" value="1">Submit Registration</button></p>
</form>
"#,
        notice = notice_html(notice.as_ref()),
        action = REGISTER_PATH,
        manual = MANUAL_ORDER_ID,
        marker = SUBMIT_MARKER,
    );
    document("Manual Registration", &content)
}
