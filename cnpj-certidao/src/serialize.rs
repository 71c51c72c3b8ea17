//! Filtered HTML serializer over a parsed `scraper` tree.
//!
//! Removals and attribute edits are applied while writing rather than by
//! mutating the tree: dropped elements are skipped with their subtree,
//! listed attributes are omitted, and extra classes are appended.

use ego_tree::NodeId;
use html_escape::{encode_double_quoted_attribute, encode_text};
use scraper::{ElementRef, Node};
use std::collections::{HashMap, HashSet};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "basefont", "bgsound", "br", "col", "embed", "frame", "hr", "img", "input",
    "keygen", "link", "meta", "param", "source", "track", "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &[
    "style", "script", "xmp", "iframe", "noembed", "noframes", "plaintext",
];

#[derive(Default)]
pub(crate) struct FilteredHtml<'a> {
    dropped: HashSet<NodeId>,
    stripped_attrs: &'a [&'a str],
    extra_classes: HashMap<NodeId, Vec<&'a str>>,
}

impl<'a> FilteredHtml<'a> {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn strip_attrs(mut self, names: &'a [&'a str]) -> Self {
        self.stripped_attrs = names;
        self
    }

    pub(crate) fn remove(&mut self, el: ElementRef<'a>) {
        self.remove_node(el.id());
    }

    /// Drop any node, text included.
    pub(crate) fn remove_node(&mut self, id: NodeId) {
        self.dropped.insert(id);
    }

    pub(crate) fn add_class(&mut self, el: ElementRef<'a>, class: &'a str) {
        let classes = self.extra_classes.entry(el.id()).or_default();
        if !classes.contains(&class) {
            classes.push(class);
        }
    }

    pub(crate) fn is_dropped(&self, el: &ElementRef<'a>) -> bool {
        self.dropped.contains(&el.id())
    }

    /// Serialize the children of `el`, i.e. its filtered inner HTML.
    pub(crate) fn inner_html(&self, el: ElementRef<'a>) -> String {
        let mut out = String::new();
        self.write_children(el, &mut out);
        out
    }

    fn write_children(&self, el: ElementRef<'a>, out: &mut String) {
        let raw_text = RAW_TEXT_ELEMENTS.contains(&el.value().name());
        for child in el.children() {
            if self.dropped.contains(&child.id()) {
                continue;
            }
            match child.value() {
                Node::Text(text) => {
                    if raw_text {
                        out.push_str(text);
                    } else {
                        push_with_nbsp(&encode_text(&**text), out);
                    }
                }
                Node::Comment(comment) => {
                    out.push_str("<!--");
                    out.push_str(comment);
                    out.push_str("-->");
                }
                Node::Element(_) => {
                    if let Some(child_el) = ElementRef::wrap(child) {
                        self.write_element(child_el, out);
                    }
                }
                _ => {}
            }
        }
    }

    fn write_element(&self, el: ElementRef<'a>, out: &mut String) {
        if self.is_dropped(&el) {
            return;
        }

        let name = el.value().name();
        out.push('<');
        out.push_str(name);

        let extra: &[&str] = self
            .extra_classes
            .get(&el.id())
            .map_or(&[], Vec::as_slice);
        let mut wrote_class = false;

        for (attr, value) in el.value().attrs() {
            if self.stripped_attrs.iter().any(|s| s.eq_ignore_ascii_case(attr)) {
                continue;
            }
            if attr == "class" && !extra.is_empty() {
                let mut merged = value.trim().to_string();
                for class in extra {
                    if !merged.split_ascii_whitespace().any(|c| c == *class) {
                        if !merged.is_empty() {
                            merged.push(' ');
                        }
                        merged.push_str(class);
                    }
                }
                write_attr(attr, &merged, out);
                wrote_class = true;
                continue;
            }
            write_attr(attr, value, out);
        }

        if !extra.is_empty() && !wrote_class {
            write_attr("class", &extra.join(" "), out);
        }
        out.push('>');

        if VOID_ELEMENTS.contains(&name) {
            return;
        }

        self.write_children(el, out);
        out.push_str("</");
        out.push_str(name);
        out.push('>');
    }
}

fn write_attr(name: &str, value: &str, out: &mut String) {
    out.push(' ');
    out.push_str(name);
    out.push_str("=\"");
    push_with_nbsp(&encode_double_quoted_attribute(value), out);
    out.push('"');
}

/// Writes already-escaped text with U+00A0 spelled `&nbsp;`.
fn push_with_nbsp(escaped: &str, out: &mut String) {
    for (i, piece) in escaped.split('\u{a0}').enumerate() {
        if i > 0 {
            out.push_str("&nbsp;");
        }
        out.push_str(piece);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::{Html, Selector};

    fn body(html: &Html) -> ElementRef<'_> {
        html.select(&Selector::parse("body").unwrap()).next().unwrap()
    }

    #[test]
    fn round_trips_plain_markup() {
        let doc = Html::parse_document(r#"<p id="a">x &amp; y<br>z</p><!-- note -->"#);
        let out = FilteredHtml::new().inner_html(body(&doc));
        assert_eq!(out, r#"<p id="a">x &amp; y<br>z</p><!-- note -->"#);
    }

    #[test]
    fn strips_listed_attributes() {
        let doc = Html::parse_document(
            r#"<table><tr><td align="center" width="10" colspan="2">v</td></tr></table>"#,
        );
        let out = FilteredHtml::new()
            .strip_attrs(&["align", "width"])
            .inner_html(body(&doc));
        assert!(out.contains(r#"<td colspan="2">v</td>"#), "{out}");
    }

    #[test]
    fn drops_subtree_and_appends_class() {
        let doc = Html::parse_document(r#"<div><span>gone</span><p class="a">kept</p><p>b</p></div>"#);
        let span = doc.select(&Selector::parse("span").unwrap()).next().unwrap();
        let p_sel = Selector::parse("p").unwrap();
        let mut ps = doc.select(&p_sel);
        let (p1, p2) = (ps.next().unwrap(), ps.next().unwrap());

        let mut out = FilteredHtml::new();
        out.remove(span);
        out.add_class(p1, "x");
        out.add_class(p2, "x");
        assert_eq!(
            out.inner_html(body(&doc)),
            r#"<div><p class="a x">kept</p><p class="x">b</p></div>"#
        );
    }

    #[test]
    fn escapes_attribute_quotes_and_nbsp() {
        let doc = Html::parse_document("<p title=\"a &quot;b&quot;\">c&nbsp;d &lt;e&gt;</p>");
        let out = FilteredHtml::new().inner_html(body(&doc));
        assert_eq!(out, r#"<p title="a &quot;b&quot;">c&nbsp;d &lt;e&gt;</p>"#);
    }

    #[test]
    fn attribute_markup_stays_inside_the_value() {
        let doc = Html::parse_document("<img alt='\"><script>x</script>' src=\"a.png\">");
        let out = FilteredHtml::new().inner_html(body(&doc));
        assert_eq!(
            out,
            r#"<img alt="&quot;&gt;&lt;script&gt;x&lt;/script&gt;" src="a.png">"#
        );
    }

    #[test]
    fn repeated_marks_on_one_element_are_merged() {
        let doc = Html::parse_document("<p>a</p><p>b</p>");
        let p_sel = Selector::parse("p").unwrap();
        let mut ps = doc.select(&p_sel);
        let (p1, p2) = (ps.next().unwrap(), ps.next().unwrap());

        let mut out = FilteredHtml::new();
        out.remove(p2);
        out.remove(p2);
        out.add_class(p1, "x");
        out.add_class(p1, "y");
        out.add_class(p1, "x");
        assert!(out.is_dropped(&p2));
        assert_eq!(out.inner_html(body(&doc)), r#"<p class="x y">a</p>"#);
    }
}
