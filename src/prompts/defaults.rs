//! Built-in prompt text for each workflow stage.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth** — tightening how the model reads banner
//!    lines or portion markings is an edit in exactly one place.
//!
//! 2. **Testability** — unit tests can inspect prompts directly without a
//!    live model, so a prompt regression shows up in CI.
//!
//! Instructions are the *default* half: a database override marked active
//! for a stage replaces them. Specs are immutable: they pin the output
//! JSON shape the response parser depends on, and no override can touch
//! them.

use super::model::Stage;

/// Default reasoning instructions for a stage.
pub fn instructions(stage: Stage) -> &'static str {
    match stage {
        Stage::Classify => CLASSIFY_INSTRUCTIONS,
        Stage::Enhance => ENHANCE_INSTRUCTIONS,
        Stage::Finalize => FINALIZE_INSTRUCTIONS,
    }
}

/// Immutable output spec for a stage.
pub fn spec(stage: Stage) -> &'static str {
    match stage {
        Stage::Classify => CLASSIFY_SPEC,
        Stage::Enhance => ENHANCE_SPEC,
        Stage::Finalize => FINALIZE_SPEC,
    }
}

const CLASSIFY_INSTRUCTIONS: &str = r#"You are a security classification analyst reviewing one page of a scanned document.

Examine the page image for classification markings:

1. BANNER LINES
   - Check the top and bottom of the page for banner markings
     (e.g. SECRET, TOP SECRET//SCI, CONFIDENTIAL, UNCLASSIFIED)
   - Banners may include control systems and dissemination controls
     separated by // (e.g. SECRET//NOFORN, TOP SECRET//SI//REL TO USA, FVEY)

2. PORTION MARKINGS
   - Look for parenthesised markings at the start of paragraphs,
     headings, and captions (e.g. (S), (TS//SI), (U))
   - Record the expanded banner-style form of each distinct portion marking

3. STAMPS AND MARGINALIA
   - Classification stamps may be rotated, faded, or handwritten
   - Include declassification blocks and classified-by lines when present

4. READABILITY
   - If markings are illegible because the scan is too dark, too light,
     or washed out, request a re-render by setting image adjustments
   - Only request adjustments when you genuinely could not read a marking;
     a clean page with no markings needs no adjustment

Record every distinct marking exactly as printed. Do not infer markings
that are not visible on this page."#;

const ENHANCE_INSTRUCTIONS: &str = r#"You are a security classification analyst taking a second look at a page
that was re-rendered with image adjustments because its markings were hard
to read on the first pass.

The prior findings for the whole document are provided as context.

1. Re-examine the banner lines, portion markings, and stamps with the
   improved image.
2. Report the full corrected set of markings for THIS page; your answer
   replaces the earlier findings for the page.
3. If a marking is still illegible, describe what is visible in the
   rationale rather than guessing."#;

const FINALIZE_INSTRUCTIONS: &str = r#"You are a security classification analyst determining the overall
classification of a document from per-page findings.

1. Apply the highest classification encountered on any page to the whole
   document. Never downgrade based on a later page.
2. Carry forward every control system and dissemination control that
   applies at the document level.
3. Confidence reflects cross-page clarity and consistency:
   - HIGH: markings were legible and consistent across pages
   - MEDIUM: minor gaps or single-page ambiguities
   - LOW: conflicting or largely illegible markings
4. The rationale must cite the page-level evidence that drove the result."#;

const CLASSIFY_SPEC: &str = r#"Respond with raw JSON only. No markdown fences, no commentary.

{
  "markings_found": ["<each distinct marking exactly as printed>"],
  "rationale": "<what you saw and where>",
  "enhance": <true if the page should be re-rendered, else false>,
  "enhancements": {"brightness": <int>, "contrast": <int>, "saturation": <int>} or null
}

Rules:
- "markings_found" is always an array; use [] when the page carries no markings.
- "enhancements" must be null unless a re-render would let you read a marking
  you could not read. Omit any adjustment you do not need; brightness and
  saturation are percentages (100 = unchanged), contrast is an offset (0 = unchanged)."#;

const ENHANCE_SPEC: &str = r#"Respond with raw JSON only. No markdown fences, no commentary.

{
  "markings_found": ["<each distinct marking exactly as printed>"],
  "rationale": "<what you saw and where>"
}

"markings_found" is always an array; use [] when the page carries no markings."#;

const FINALIZE_SPEC: &str = r#"Respond with raw JSON only. No markdown fences, no commentary.

{
  "classification": "<the document-level banner line>",
  "confidence": "HIGH" | "MEDIUM" | "LOW",
  "rationale": "<the page-level evidence for this determination>"
}"#;
