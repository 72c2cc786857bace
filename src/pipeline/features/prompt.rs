use serde_json::{json, Value};

use crate::catalog::FieldCatalog;

pub const FEATURE_SYSTEM_PROMPT: &str = r#"
You are a medical lab report data extractor. Your ONLY role is to read raw
OCR text from a lab report and report the numeric values it states.

RULES (ABSOLUTE, NO EXCEPTIONS):
1. Report ONLY values explicitly written in the document.
2. NEVER estimate, infer or convert a value that is not written.
3. If a field cannot be found, output 0 for it. Never output null or text.
4. Output MUST be a single JSON object and nothing else.
"#;

/// Build the extraction instruction for one batch of OCR text.
///
/// The field list is taken from `catalog` in order, so the returned
/// positions line up with the analyzer's positions.
pub fn build_feature_prompt(raw_text: &str, catalog: &FieldCatalog) -> String {
    let count = catalog.len();
    let field_list: String = catalog
        .names()
        .enumerate()
        .map(|(i, name)| format!("{}. {name}\n", i + 1))
        .collect();

    format!(
        r#"<document>
{raw_text}
</document>

Extract the following {count} lab values from the document above, in EXACTLY this order:
{field_list}
Return a JSON object of the form {{"features": [v1, v2, ..., v{count}]}} where:
- the array contains exactly {count} numbers, in the order listed above;
- each number is the value as written in the document, without units;
- 0 is used for any field that is not present in the document (never null, never a string).
"#
    )
}

/// JSON schema constraining the collaborator's output to `count` numbers.
pub fn feature_schema(count: usize) -> Value {
    json!({
        "type": "object",
        "properties": {
            "features": {
                "type": "array",
                "items": { "type": "number" },
                "minItems": count,
                "maxItems": count
            }
        },
        "required": ["features"]
    })
}
