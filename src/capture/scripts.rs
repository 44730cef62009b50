//! Page-side scripts used by the capture pipeline
//!
//! Every script is a self-contained expression evaluated with
//! `returnByValue`, so results come back as plain JSON.

/// Serialized document
pub const OUTER_HTML_SCRIPT: &str = "document.documentElement ? document.documentElement.outerHTML : ''";

/// Markdown rendering of the readable content
///
/// Walks headings, paragraphs, links, list items and code blocks in
/// document order. Links are emitted on their own only when they do not
/// sit inside another extracted block.
pub const MARKDOWN_SCRIPT: &str = r#"
(() => {
    const root = document.body;
    if (!root) return '';
    const clean = (s) => (s || '').replace(/\s+/g, ' ').trim();
    const blocks = [];
    const title = clean(document.title);
    if (title) blocks.push('# ' + title);
    const nodes = root.querySelectorAll('h1, h2, h3, h4, h5, h6, p, a[href], li, pre');
    for (const el of nodes) {
        const tag = el.tagName.toLowerCase();
        if (tag === 'pre') {
            blocks.push('```\n' + (el.textContent || '').replace(/\n+$/, '') + '\n```');
        } else if (tag === 'a') {
            if (el.parentElement && el.parentElement.closest('p, li, h1, h2, h3, h4, h5, h6, pre')) continue;
            const text = clean(el.textContent);
            if (text) blocks.push('[' + text + '](' + el.href + ')');
        } else if (tag === 'li') {
            const text = clean(el.innerText);
            if (text) blocks.push('- ' + text);
        } else if (tag === 'p') {
            if (el.closest('li')) continue;
            const text = clean(el.innerText);
            if (text) blocks.push(text);
        } else {
            const text = clean(el.textContent);
            if (text) blocks.push('#'.repeat(Number(tag[1])) + ' ' + text);
        }
    }
    return blocks.join('\n\n');
})()
"#;

/// Document and viewport size
pub const PAGE_METRICS_SCRIPT: &str = r#"
(() => {
    const doc = document.documentElement;
    return {
        width: doc ? doc.scrollWidth : 0,
        height: doc ? doc.scrollHeight : 0,
        viewportWidth: window.innerWidth,
        viewportHeight: window.innerHeight
    };
})()
"#;

/// Structural digest
///
/// Only fixed selector classes are queried; headings are capped at three
/// and clipped before they leave the page.
pub const DOM_SUMMARY_SCRIPT: &str = r#"
(() => {
    const count = (selector) => document.querySelectorAll(selector).length;
    const clip = (s, n) => {
        const t = (s || '').replace(/\s+/g, ' ').trim();
        return t.length > n ? t.slice(0, n - 1) + '…' : t;
    };
    const headings = [];
    for (const h of document.querySelectorAll('h1, h2, h3')) {
        const text = clip(h.textContent, 60);
        if (text) headings.push(text);
        if (headings.length === 3) break;
    }
    return {
        buttons: count('button, input[type="button"], input[type="submit"], [role="button"]'),
        inputs: count('input:not([type="hidden"]):not([type="button"]):not([type="submit"]), textarea, select'),
        links: count('a[href]'),
        hasNavigation: document.querySelector('nav, [role="navigation"]') !== null,
        hasMain: document.querySelector('main, [role="main"]') !== null,
        hasForm: document.querySelector('form') !== null,
        headings
    };
})()
"#;
