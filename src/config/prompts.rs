//! System instruction template and user-facing assistant texts
//!
//! The instruction is a fixed template with a single catalog placeholder.

use crate::catalog::CatalogSnapshot;

pub const CATALOG_PLACEHOLDER: &str = "{productCatalogOverview}";

/// Substitute the catalog overview into the system instruction template.
/// Never fails; an empty snapshot yields the generic "no products" overview.
pub fn compose_system_instruction(snapshot: &CatalogSnapshot) -> String {
    builtin::SYSTEM_PROMPT_TEMPLATE.replace(CATALOG_PLACEHOLDER, &snapshot.overview())
}

/// Welcome message posted once the session is open
pub fn welcome_message(advisory: Option<&str>) -> String {
    match advisory {
        Some(note) => format!("{}\n\nNote: {}", builtin::WELCOME, note),
        None => builtin::WELCOME.to_string(),
    }
}

/// Built-in texts that don't require files
pub mod builtin {
    pub const SYSTEM_PROMPT_TEMPLATE: &str = r#"You are "AudioGuide", a friendly, expert, and highly knowledgeable AI shopping assistant for "Hifiisti", a Shopify store located at hifisti.myshopify.com. Hifiisti specializes in high-fidelity audio equipment, including turntables, amplifiers, speakers, headphones, DACs, and accessories for discerning audiophiles. Our customers are music lovers and audiophiles seeking top-quality sound reproduction, expert advice, and components to build or upgrade their dream audio systems.

{productCatalogOverview}

We also feature a blog with articles on topics like:
- "Turntable Setup Guide: Getting the Best Sound from Your Vinyl"
- "Choosing the Right Amplifier for Your Speakers: A Comprehensive Guide"
- "Understanding Hi-Res Audio: Formats, Sources, and Benefits"
- "Headphone Showdown: Open-Back vs. Closed-Back for Different Listening Experiences"
- "DAC Magic: Why You Need a Digital-to-Analog Converter"

**IMPORTANT: Keep your answers concise and to the point. Aim for 1-2 sentences unless more detail is specifically requested or necessary for a product description. Your main goal is to quickly guide the user to a relevant product.**

Your primary role is to:
1.  Quickly engage customers to understand their immediate audio need.
2.  Provide personalized product recommendations *from Hifiisti's catalog that has been provided to you* as soon as a potential need is identified. Be specific. When recommending a product, mention its name, key features, and price. Use the `PRODUCT_LINK[handle|Product Title]` format for clickable links to the product.
3.  When describing a product, focus on its most compelling key features, sound characteristics, and benefits, drawing from the catalog information. Mention the price. Keep descriptions brief unless asked for more.
4.  If a customer seems unsure or provides very little information, try to make a best-guess product recommendation based on common needs or popular items in the catalog. You can then ask if that's close to what they're looking for or if they have other preferences.
5.  If relevant, briefly recommend blog articles that could provide further information or setup advice. Summarize in one sentence why the article is useful.
6.  Maintain a helpful, enthusiastic, expert, and approachable tone. Use emojis occasionally to enhance friendliness (e.g., 🎧🎶🔊) but maintain professionalism and brevity.
7.  If you use Google Search for up-to-date information (e.g., new audio technologies, specific compatibility questions not covered in the catalog), you MUST cite your sources by listing the web URLs from the search results directly under your response.
8.  Do not make up URLs or sources. Only list URLs provided by the Google Search tool.
9.  If you cannot find a suitable product *from the provided catalog* or information, politely state that, and perhaps offer to search for general advice or suggest a broader category.
10. Do not ask for API keys or any personal identifiable information beyond what's needed for an audio consultation (like listening preferences or current gear).

Let's help every visitor to Hifiisti find the perfect audio gear to elevate their listening experience! Try to recommend a product in your first or second response if possible."#;

    pub const WELCOME: &str = "Welcome to Hifiisti! I'm AudioGuide, your AI assistant. 🎧 I'm currently learning about our latest product selection. I'm ready and can help you find the perfect audio gear!";

    pub const STATUS_INITIALIZING: &str = "Initializing AudioGuide...";
    pub const STATUS_PREPARING: &str = "Preparing AI assistant with product data...";
    pub const STATUS_CONNECTING: &str = "Connecting to AI assistant...";
    pub const STATUS_READY: &str = "AudioGuide is ready.";
    pub const STATUS_KEY_MISSING: &str = "Gemini API Key not configured. AudioGuide cannot operate.";

    pub const CATALOG_NOT_CONFIGURED: &str = "Shopify not configured. Product data is unavailable.";
    pub const CATALOG_NOT_CONFIGURED_DETAIL: &str = "Shopify connection not configured or using placeholder credentials. Product-specific recommendations will be limited. Please set SHOPIFY_STORE_DOMAIN and SHOPIFY_STOREFRONT_ACCESS_TOKEN environment variables.";

    pub const SEND_REJECTED: &str = "Cannot send message. Chat service is not available. Ensure API keys (Gemini, Shopify) are configured.";
    pub const SEND_IN_FLIGHT: &str = "AudioGuide is still answering. Please wait for the current reply to finish.";

    pub fn loading_catalog(domain: &str) -> String {
        format!("Loading product catalog from {}...", domain)
    }

    pub fn catalog_failed(error: &str) -> String {
        format!(
            "Failed to load products from Shopify: {}. Product recommendations may be unavailable or general. Ensure Shopify credentials are correct.",
            error
        )
    }

    pub fn reply_failed(error: &str) -> String {
        format!("AI Error: {}", error)
    }

    pub fn stream_failed_notice(reply_text: &str) -> String {
        format!("Error during AI response: {}", reply_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Product, CatalogSnapshot};
    use crate::config::CatalogSettings;

    #[test]
    fn test_template_has_single_placeholder() {
        assert_eq!(builtin::SYSTEM_PROMPT_TEMPLATE.matches(CATALOG_PLACEHOLDER).count(), 1);
    }

    #[test]
    fn test_compose_with_empty_catalog() {
        let instruction = compose_system_instruction(&CatalogSnapshot::empty());
        assert!(!instruction.is_empty());
        assert!(!instruction.contains(CATALOG_PLACEHOLDER));
        assert!(instruction.contains("No products are currently available in the catalog."));
    }

    #[test]
    fn test_compose_with_products() {
        let products: Vec<Product> = (0..3)
            .map(|n| Product {
                id: n.to_string(),
                handle: format!("dac-{}", n),
                title: format!("DAC {}", n),
                ..Default::default()
            })
            .collect();
        let snapshot = CatalogSnapshot::from_products(&products, &CatalogSettings::default());
        let instruction = compose_system_instruction(&snapshot);

        assert!(!instruction.contains(CATALOG_PLACEHOLDER));
        assert!(instruction.contains("- DAC 2 (Handle: dac-2, Type: Uncategorized)"));
    }

    #[test]
    fn test_welcome_message() {
        assert_eq!(welcome_message(None), builtin::WELCOME);
        let with_note = welcome_message(Some(builtin::CATALOG_NOT_CONFIGURED));
        assert!(with_note.ends_with("\n\nNote: Shopify not configured. Product data is unavailable."));
    }
}
