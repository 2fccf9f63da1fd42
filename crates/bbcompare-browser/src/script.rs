//! In-page JavaScript snippets evaluated by [`crate::ChromiumDriver`].
//!
//! Selectors and values are embedded as JSON string literals, so quotes
//! and backslashes in provider config cannot break out of the script.

use std::collections::BTreeMap;

use bbcompare_scraper::SCOPE_SELECTOR;

/// Result strings returned by [`fill`].
pub const FILL_MISSING: &str = "missing";

fn literal(value: &str) -> String {
    serde_json::Value::String(value.to_owned()).to_string()
}

/// Number of elements matching `selector`. Invalid selectors count as zero.
#[must_use]
pub fn count(selector: &str) -> String {
    format!(
        "(() => {{ try {{ return document.querySelectorAll({sel}).length; }} catch (e) {{ return 0; }} }})()",
        sel = literal(selector)
    )
}

/// Clicks the `index`-th match of `selector`. Evaluates to `false` when
/// there is no such element.
#[must_use]
pub fn click(selector: &str, index: usize) -> String {
    format!(
        "(() => {{ \
            const el = document.querySelectorAll({sel})[{index}]; \
            if (!el) return false; \
            el.scrollIntoView({{ block: 'center' }}); \
            el.click(); \
            return true; \
        }})()",
        sel = literal(selector)
    )
}

/// Puts `value` into the first match of `selector`.
///
/// Text inputs get the value through the native setter plus `input` and
/// `change` events so framework-bound fields notice. Selects pick the
/// option whose value or label equals `value`. Anything else is clicked.
/// Evaluates to `"typed"`, `"selected"`, `"clicked"` or [`FILL_MISSING`].
#[must_use]
pub fn fill(selector: &str, value: &str) -> String {
    format!(
        "(() => {{ \
            const el = document.querySelector({sel}); \
            const value = {val}; \
            if (!el) return {missing}; \
            const tag = el.tagName.toLowerCase(); \
            const notify = () => {{ \
                el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
                el.dispatchEvent(new Event('change', {{ bubbles: true }})); \
            }}; \
            if (tag === 'select') {{ \
                const option = Array.from(el.options) \
                    .find(o => o.value === value || o.text.trim() === value); \
                el.value = option ? option.value : value; \
                notify(); \
                return 'selected'; \
            }} \
            const textual = tag === 'textarea' || (tag === 'input' && \
                !['checkbox', 'radio', 'button', 'submit'].includes(el.type)); \
            if (textual) {{ \
                el.focus(); \
                const proto = tag === 'textarea' ? HTMLTextAreaElement.prototype : HTMLInputElement.prototype; \
                Object.getOwnPropertyDescriptor(proto, 'value').set.call(el, value); \
                notify(); \
                el.blur(); \
                return 'typed'; \
            }} \
            el.click(); \
            return 'clicked'; \
        }})()",
        sel = literal(selector),
        val = literal(value),
        missing = literal(FILL_MISSING),
    )
}

/// One object per match of `container`, mapping each `field_map` key to the
/// trimmed text of the first match of its selector inside that element.
/// [`SCOPE_SELECTOR`] reads the container itself. Unmatched fields are left
/// out.
#[must_use]
pub fn extract_all(container: &str, field_map: &BTreeMap<String, String>) -> String {
    let fields = serde_json::to_string(field_map).unwrap_or_else(|_| "{}".to_owned());
    format!(
        "(() => {{ \
            const fields = {fields}; \
            const text = el => (el.innerText || el.textContent || '').replace(/\\s+/g, ' ').trim(); \
            return Array.from(document.querySelectorAll({sel})).map(container => {{ \
                const row = {{}}; \
                for (const [key, selector] of Object.entries(fields)) {{ \
                    let el = null; \
                    if (selector === {scope}) {{ el = container; }} \
                    else {{ try {{ el = container.querySelector(selector); }} catch (e) {{ el = null; }} }} \
                    if (el) row[key] = text(el); \
                }} \
                return row; \
            }}); \
        }})()",
        sel = literal(container),
        scope = literal(SCOPE_SELECTOR),
    )
}
