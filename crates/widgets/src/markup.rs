//! Shared product-card markup used by the stock widget types.

use pwx_core::types::Product;
use pwx_personalization::JourneyEntry;
use pwx_template::escape_html;

pub(crate) fn format_price(amount: f64) -> String {
    format!("${amount:.2}")
}

pub(crate) fn product_card(product: &Product) -> String {
    let price = if product.on_sale() {
        format!(
            "<span class=\"pwx-price-sale\">{}</span><span class=\"pwx-price-original\">{}</span>",
            format_price(product.display_price()),
            format_price(product.price),
        )
    } else {
        format!(
            "<span class=\"pwx-price\">{}</span>",
            format_price(product.price)
        )
    };
    format!(
        concat!(
            "<div class=\"pwx-product-card\" data-pwx-product-id=\"{id}\">",
            "<a class=\"pwx-product-link\" href=\"{url}\">",
            "<img class=\"pwx-product-image\" src=\"{image}\" alt=\"{title}\" loading=\"lazy\">",
            "<div class=\"pwx-product-title\">{title}</div>",
            "<div class=\"pwx-product-price\">{price}</div>",
            "</a></div>",
        ),
        id = escape_html(&product.id),
        url = escape_html(&product.url),
        image = escape_html(&product.image),
        title = escape_html(&product.title),
        price = price,
    )
}

/// Card for a journey entry (RecentlyViewed renders from the tracker,
/// not from API products).
pub(crate) fn journey_card(entry: &JourneyEntry) -> String {
    format!(
        concat!(
            "<div class=\"pwx-product-card\" data-pwx-product-id=\"{id}\">",
            "<a class=\"pwx-product-link\" href=\"{url}\">",
            "<img class=\"pwx-product-image\" src=\"{image}\" alt=\"{title}\" loading=\"lazy\">",
            "<div class=\"pwx-product-title\">{title}</div>",
            "<div class=\"pwx-product-price\"><span class=\"pwx-price\">{price}</span></div>",
            "</a></div>",
        ),
        id = escape_html(&entry.product_id),
        url = escape_html(&entry.url),
        image = escape_html(&entry.image),
        title = escape_html(&entry.title),
        price = format_price(entry.price),
    )
}
