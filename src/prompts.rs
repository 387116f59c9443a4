//! Prompt templates for generation and intent classification.
//!
//! The generation prompts pin the model to the `[--FILE:name--]` marker
//! format first; the JSON reply shape is the documented fallback the
//! extractor also understands.

/// System prompt for every generation call. Demands the literal file
/// marker format so the stream can be split into three files.
pub const GENERATION_SYSTEM_PROMPT: &str = r#"You are an expert web developer AI. Your task is to generate a complete, self-contained set of HTML, CSS, and JavaScript code based on the user's request.

CRITICAL: You MUST structure your response using these EXACT file markers. Do not use any other format:

[--FILE:index.html--]
<!DOCTYPE html>
<html>
<head>
    <title>Your Title</title>
</head>
<body>
    <!-- Your HTML content here -->
</body>
</html>

[--FILE:styles.css--]
/* Your CSS styles here */
body {
    margin: 0;
    padding: 20px;
}

[--FILE:index.js--]
// Your JavaScript code here
console.log('Hello World');

IMPORTANT RULES:
1. ALWAYS start with the [--FILE:index.html--] marker
2. ALWAYS include the [--FILE:styles.css--] marker
3. ALWAYS include the [--FILE:index.js--] marker
4. Do NOT include any markdown formatting like ```html
5. Do NOT include any explanatory text outside the file markers
6. Provide complete, working code for each file"#;

/// One-word classification instruction. The answer is matched against the
/// substring "create"; anything else is treated as modify.
pub fn intent_prompt(has_code: bool, prompt: &str) -> String {
    format!(
        r#"Analyze the user's request.
Context: Has existing code: {has_code}.
Request: {prompt}

Consider these factors:
- Keywords like "new", "create", "build", "make", "start over" suggest creation
- Keywords like "add", "change", "update", "modify", "fix", "improve" suggest modification
- If the user mentions specific elements to change, it is likely modification

Respond with only one word: create or modify.
- "create": there is no code OR the user explicitly asks to start over, a new page, a different concept, or a complete rebuild
- "modify": all other changes including additions, improvements, fixes, and enhancements"#,
        has_code = if has_code { "Yes" } else { "No" },
        prompt = prompt,
    )
}

/// User prompt for a create request.
pub fn creation_prompt(prompt: &str) -> String {
    format!(
        r#"Create a complete, modern, and visually appealing website for this request: "{prompt}"

DESIGN REQUIREMENTS:
- Modern, clean aesthetics with responsive design that works on all devices
- Semantic, accessible HTML5 with proper meta tags
- Modern CSS using custom properties, flexbox/grid, and smooth transitions
- Vanilla JavaScript with ES6+ features and proper event handling

Respond with the three files in the required marker format."#,
        prompt = prompt,
    )
}

/// User prompt for a modify request. The three current files ride along
/// verbatim and the model is told to return complete files, never diffs.
pub fn modification_prompt(prompt: &str, html: &str, css: &str, js: &str) -> String {
    format!(
        r#"Modify the existing website based on this request: "{prompt}"

Current HTML:
```html
{html}
```

Current CSS:
```css
{css}
```

Current JS:
```javascript
{js}
```

MODIFICATION RULES:
- Preserve existing functionality while applying the requested changes
- Maintain design consistency with the current code
- Return COMPLETE updated files in the required marker format, not diffs
- Include every file, even ones you did not change"#,
        prompt = prompt,
        html = html,
        css = css,
        js = js,
    )
}
