//! In-page JavaScript used by the perception layers.
//!
//! Function declarations are meant for `Runtime.callFunctionOn` (`this` is the element);
//! expressions are meant for `Runtime.evaluate`.

/// Absolute xpath of `this`, with positional predicates only where siblings share a tag.
pub const NODE_PATH_FUNCTION: &str = r#"function () {
  if (!this || this.nodeType === undefined) { return ''; }
  const steps = [];
  let node = this;
  while (node && node.nodeType !== Node.DOCUMENT_NODE) {
    if (node.nodeType === Node.TEXT_NODE) {
      const parent = node.parentNode;
      const texts = parent ? Array.from(parent.childNodes).filter(n => n.nodeType === Node.TEXT_NODE) : [node];
      steps.unshift(texts.length > 1 ? `text()[${texts.indexOf(node) + 1}]` : 'text()');
      node = parent;
      continue;
    }
    if (node.nodeType !== Node.ELEMENT_NODE) { node = node.parentNode; continue; }
    const tag = node.localName || node.nodeName.toLowerCase();
    const parent = node.parentNode;
    let step = tag;
    if (parent && parent.children) {
      const same = Array.from(parent.children).filter(c => c.localName === node.localName);
      if (same.length > 1) { step = `${tag}[${same.indexOf(node) + 1}]`; }
    }
    steps.unshift(step);
    node = parent instanceof ShadowRoot ? parent.host : parent;
  }
  return '/' + steps.join('/');
}"#;

/// Lower-case tag name of `this`, or `""` for non-elements.
pub const TAG_NAME_FUNCTION: &str =
    "function () { return this && this.tagName ? this.tagName.toLowerCase() : ''; }";

/// Xpaths of every scrollable container, as reported by the injected candidate scanner.
pub const SCROLLABLE_XPATHS_EXPRESSION: &str = "(() => typeof window.getScrollableElementXpaths === 'function' ? window.getScrollableElementXpaths() : [])()";

/// Expression evaluating `xpath` to its first matching node (or `null`).
pub fn xpath_lookup_expression(xpath: &str) -> String {
    let literal = serde_json::to_string(xpath).unwrap_or_else(|_| "\"\"".to_string());
    format!(
        "(() => {{ try {{ return document.evaluate({literal}, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue; }} catch (e) {{ return null; }} }})()"
    )
}
