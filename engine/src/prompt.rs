use std::collections::HashSet;

use nonempty::NonEmpty;
use serde::{Deserialize, Serialize};

use crate::input::{InputError, ProductInput};

pub const SYSTEM_MESSAGE: &str = "Create a 970:600 px full module (strictly follow this size for the generated module, \
don’t generate other sizes) for the product following the instructions below.
Make sure to read the instructions carefully and include all required text without missing any details.
Don’t change the look of the submitted logo if included.";

const PLACEMENT_GUIDELINES: &str = indoc::indoc! {"
    - Include both the provided PRODUCT and LOGO in the final image.
    - Keep the LOGO pristine (no visual alterations); place it cleanly (e.g., top-right).
    - Display the PRODUCT prominently (left or center-left) with space for text on the right.
    - Maintain a cohesive, premium, Montessori-inspired tone and color harmony."};

const DEFAULT_PALETTE: &str = indoc::indoc! {"
    - Palette: #F8F3EC base, #BFD8B8 accent, #2A2A2A text.
    - Typography: Poppins SemiBold for headlines, Open Sans Regular for body copy.
    - Tone: premium, modern, calm. Avoid unverifiable claims and hard calls to action."};

/// One A+ module. `instructions` may reference the product title as `{title}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleTemplate {
    pub id: String,
    pub purpose: String,
    pub instructions: String,
}

impl ModuleTemplate {
    fn new(id: &str, purpose: &str, instructions: &str) -> Self {
        Self {
            id: id.into(),
            purpose: purpose.into(),
            instructions: instructions.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModulePrompt {
    pub module_id: String,
    pub prompt_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrandStyle {
    pub guidelines: String,
    /// Free-form brand guidance supplied by the user.
    pub extra: Option<String>,
}

impl Default for BrandStyle {
    fn default() -> Self {
        Self {
            guidelines: DEFAULT_PALETTE.into(),
            extra: None,
        }
    }
}

impl BrandStyle {
    pub fn with_extra(mut self, extra: Option<String>) -> Self {
        self.extra = extra;
        self
    }

    fn render(&self) -> String {
        match &self.extra {
            Some(extra) => format!("{}\n{extra}", self.guidelines),
            None => self.guidelines.clone(),
        }
    }
}

/// The built-in storyline: awareness, education, proof, connection, conversion.
pub fn default_templates() -> NonEmpty<ModuleTemplate> {
    nonempty::nonempty![
        ModuleTemplate::new(
            "brand-story",
            "Brand Story (Awareness)",
            indoc::indoc! {"
                Hero layout: a large hero shot of the product on the left two thirds of the canvas
                over a soft, warm background. Headline on the right introducing {title} and the
                brand behind it, one short supporting sentence below, both left-aligned."},
        ),
        ModuleTemplate::new(
            "craftsmanship",
            "Craftsmanship (Education)",
            indoc::indoc! {"
                Split-left visual: a close-up of the product's materials and finish on the left,
                text on the right. Headline about how {title} is made, followed by two short
                captions on materials and build quality."},
        ),
        ModuleTemplate::new(
            "features",
            "Features Breakdown (Proof)",
            indoc::indoc! {"
                Feature callout layout: the product centered with three or four thin callout lines
                pointing to its key features, each with a two to four word label. A short headline
                at the top naming {title}."},
        ),
        ModuleTemplate::new(
            "lifestyle",
            "Lifestyle & Use Cases (Connection)",
            indoc::indoc! {"
                Lifestyle setting: the product in a bright, tidy home environment in use, placed
                center-left. Headline on the right describing everyday moments with {title}, with a
                single caption underneath."},
        ),
        ModuleTemplate::new(
            "reviews-cta",
            "Reviews & CTA (Conversion)",
            indoc::indoc! {"
                Closing module: the product on the left, a short customer-style quote on the right
                and a subtle invitation to choose {title}. Keep the call to action gentle and the
                layout airy."},
        ),
    ]
}

/// Ids become file names, so they must be non-empty, filename-safe and unique.
pub fn validate_templates(templates: &NonEmpty<ModuleTemplate>) -> Result<(), InputError> {
    let mut seen = HashSet::new();
    for template in templates.iter() {
        let invalid = |reason: &str| InputError::InvalidTemplate {
            id: template.id.clone(),
            reason: reason.into(),
        };

        if template.id.is_empty() {
            return Err(invalid("the id is empty"));
        }
        if !template
            .id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
        {
            return Err(invalid("ids may only contain a-z, 0-9, '-' and '_'"));
        }
        if !seen.insert(template.id.as_str()) {
            return Err(invalid("the id is used more than once"));
        }
    }
    Ok(())
}

/// Keeps the templates named in `ids`, in template order. An empty selection keeps everything.
pub fn select_templates(
    templates: &NonEmpty<ModuleTemplate>,
    ids: &[String],
) -> Result<NonEmpty<ModuleTemplate>, InputError> {
    if ids.is_empty() {
        return Ok(templates.clone());
    }

    let available = || {
        templates
            .iter()
            .map(|t| t.id.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };

    for id in ids {
        if !templates.iter().any(|t| &t.id == id) {
            return Err(InputError::UnknownModule {
                id: id.clone(),
                available: available(),
            });
        }
    }

    let selected = templates
        .iter()
        .filter(|t| ids.contains(&t.id))
        .cloned()
        .collect::<Vec<_>>();

    NonEmpty::from_vec(selected).ok_or_else(|| InputError::UnknownModule {
        id: ids.join(", "),
        available: available(),
    })
}

pub fn build_prompts(
    input: &ProductInput,
    templates: &NonEmpty<ModuleTemplate>,
    style: &BrandStyle,
) -> Vec<ModulePrompt> {
    templates
        .iter()
        .map(|template| ModulePrompt {
            module_id: template.id.clone(),
            prompt_text: build_prompt(&input.title, template, style),
        })
        .collect()
}

fn build_prompt(title: &str, template: &ModuleTemplate, style: &BrandStyle) -> String {
    let purpose = &template.purpose;
    let instructions = template.instructions.replace("{title}", title);
    let style = style.render();

    indoc::formatdoc! {"
        {SYSTEM_MESSAGE}

        Instructions:
        Module: {purpose}
        Product title: {title}
        {instructions}

        Brand style:
        {style}

        Placement guidelines:
        {PLACEMENT_GUIDELINES}
    "}
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::input::ReferenceImage;

    const TITLE: &str = "Tiny Land Triangle Climbing Frame";

    fn input() -> ProductInput {
        let image = |name: &str| ReferenceImage {
            file_name: name.into(),
            mime_type: "image/jpeg".into(),
            data: Bytes::from_static(b"jpeg"),
        };
        ProductInput {
            product_image: image("product.jpg"),
            logo_image: image("logo.jpg"),
            title: TITLE.into(),
        }
    }

    #[test]
    fn defaults_are_valid() {
        validate_templates(&default_templates()).unwrap();
    }

    #[test]
    fn prompts_are_deterministic_and_ordered() {
        let templates = default_templates();
        let first = build_prompts(&input(), &templates, &BrandStyle::default());
        let second = build_prompts(&input(), &templates, &BrandStyle::default());

        assert_eq!(first, second);
        let ids = first.iter().map(|p| p.module_id.as_str()).collect::<Vec<_>>();
        assert_eq!(
            ids,
            ["brand-story", "craftsmanship", "features", "lifestyle", "reviews-cta"]
        );
    }

    #[test]
    fn prompts_contain_title_and_frame() {
        let templates = nonempty::nonempty![ModuleTemplate::new("hero", "Hero", "Show it off.")];
        let prompts = build_prompts(&input(), &templates, &BrandStyle::default());
        let text = &prompts[0].prompt_text;

        assert!(text.starts_with("Create a 970:600 px full module"));
        assert!(text.contains("Product title: Tiny Land Triangle Climbing Frame\nShow it off."));
        assert!(text.contains("#F8F3EC base"));
        assert!(text.contains("Keep the LOGO pristine"));
        assert!(!text.contains("{title}"));
    }

    #[test]
    fn title_placeholder_is_interpolated() {
        let templates = default_templates();
        let prompts = build_prompts(&input(), &templates, &BrandStyle::default());
        for prompt in prompts {
            assert!(!prompt.prompt_text.contains("{title}"));
            assert!(prompt.prompt_text.matches(TITLE).count() >= 2);
        }
    }

    #[test]
    fn extra_style_instructions_are_appended() {
        let style = BrandStyle::default().with_extra(Some("Always show the ramp.".into()));
        let prompts = build_prompts(&input(), &default_templates(), &style);
        assert!(
            prompts[0]
                .prompt_text
                .contains("Avoid unverifiable claims and hard calls to action.\nAlways show the ramp.")
        );
    }

    #[test]
    fn selection_keeps_template_order() {
        let ids = vec!["lifestyle".to_string(), "brand-story".to_string()];
        let selected = select_templates(&default_templates(), &ids).unwrap();
        let selected_ids = selected.iter().map(|t| t.id.as_str()).collect::<Vec<_>>();
        assert_eq!(selected_ids, ["brand-story", "lifestyle"]);
    }

    #[test]
    fn selection_rejects_unknown_ids() {
        let err = select_templates(&default_templates(), &["hero".into()]).unwrap_err();
        assert!(matches!(err, InputError::UnknownModule { ref id, .. } if id == "hero"));
    }

    #[test]
    fn validation_rejects_colliding_ids() {
        let duplicated = nonempty::nonempty![
            ModuleTemplate::new("hero", "Hero", "a"),
            ModuleTemplate::new("hero", "Hero again", "b"),
        ];
        assert!(matches!(
            validate_templates(&duplicated),
            Err(InputError::InvalidTemplate { .. })
        ));

        let unsafe_id = nonempty::nonempty![ModuleTemplate::new("../hero", "Hero", "a")];
        assert!(matches!(
            validate_templates(&unsafe_id),
            Err(InputError::InvalidTemplate { .. })
        ));
    }
}
