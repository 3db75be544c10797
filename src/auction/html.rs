//! Markup helpers shared by discovery and extraction.
//!
//! Pages are parsed into a DOM with `scraper`. [`flatten`] walks a subtree
//! once in document order and returns its visible text together with the
//! text offsets at which links, images and headings start, so callers can
//! carve regions between markers without touching raw markup.

use reqwest::Url;
use scraper::{node::Element, ElementRef, Node};

/// Elements whose text never reaches the page.
const HIDDEN_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

/// Lazy-load attributes, preferred over `src`.
const LAZY_IMAGE_ATTRS: &[&str] = &["data-src", "data-lazy-src", "data-original", "data-lazy"];

/// Image paths that are never the item photo.
const IMAGE_SKIP_MARKERS: &[&str] = &["placeholder", "icon", "logo", "spinner", "blank.", "loading", "data:image"];

/// A link, image or heading met while flattening.
#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    /// Byte offset into [`FlatText::text`] where the element starts.
    pub offset: usize,
    /// `href` for links, the chosen source for images, empty for headings.
    pub value: String,
    /// Link text, image alt text or heading text.
    pub label: String,
}

/// Visible text of a subtree plus element markers.
#[derive(Debug, Clone, Default)]
pub struct FlatText {
    /// Whitespace-collapsed, entity-decoded text.
    pub text: String,
    pub links: Vec<Marker>,
    pub images: Vec<Marker>,
    pub headings: Vec<Marker>,
}

impl FlatText {
    /// Trimmed text between two byte offsets.
    pub fn slice(&self, start: usize, end: usize) -> &str {
        let start = floor_boundary(&self.text, start);
        let end = ceil_boundary(&self.text, end.max(start));
        self.text[start..end].trim()
    }
}

/// Flatten `root` into text and markers, skipping scripts and styles.
pub fn flatten(root: ElementRef<'_>) -> FlatText {
    let mut flat = FlatText::default();

    for node in root.descendants() {
        let hidden = std::iter::once(node).chain(node.ancestors()).any(|n| {
            n.value()
                .as_element()
                .is_some_and(|e| HIDDEN_ELEMENTS.contains(&e.name()))
        });
        if hidden {
            continue;
        }

        match node.value() {
            Node::Text(text) => push_words(&mut flat.text, text),
            Node::Element(el) => {
                let offset = flat.text.len();
                let label = || ElementRef::wrap(node).map(element_text).unwrap_or_default();
                match el.name() {
                    "a" => {
                        if let Some(href) = el.attr("href").map(str::trim).filter(|h| !h.is_empty()) {
                            flat.links.push(Marker {
                                offset,
                                value: href.to_string(),
                                label: label(),
                            });
                        }
                    }
                    "img" => {
                        if let Some(src) = image_source(el) {
                            flat.images.push(Marker {
                                offset,
                                value: src,
                                label: el.attr("alt").map(collapse).unwrap_or_default(),
                            });
                        }
                    }
                    "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => flat.headings.push(Marker {
                        offset,
                        value: String::new(),
                        label: label(),
                    }),
                    _ => {}
                }
            }
            _ => {}
        }
    }

    flat
}

/// Collapsed text content of one element.
pub fn element_text(el: ElementRef<'_>) -> String {
    collapse(&el.text().collect::<Vec<_>>().join(" "))
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn push_words(out: &mut String, text: &str) {
    for word in text.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
}

/// Preferred source of an `<img>`: lazy-load attributes first, then `src`,
/// skipping placeholders and icons.
pub fn image_source(el: &Element) -> Option<String> {
    LAZY_IMAGE_ATTRS
        .iter()
        .chain(std::iter::once(&"src"))
        .filter_map(|attr| el.attr(attr))
        .map(str::trim)
        .find(|src| {
            let lower = src.to_lowercase();
            !src.is_empty() && !IMAGE_SKIP_MARKERS.iter().any(|m| lower.contains(m))
        })
        .map(String::from)
}

/// Resolve `href` against `base`. Returns `None` for unusable links.
pub fn absolutize(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
        return None;
    }
    let joined = match Url::parse(href) {
        Ok(url) => url,
        Err(_) => Url::parse(base).ok()?.join(href).ok()?,
    };
    Some(joined.to_string())
}

/// Largest char boundary at or below `idx`.
pub fn floor_boundary(s: &str, idx: usize) -> usize {
    let mut i = idx.min(s.len());
    while !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Smallest char boundary at or above `idx`.
pub fn ceil_boundary(s: &str, idx: usize) -> usize {
    let mut i = idx.min(s.len());
    while !s.is_char_boundary(i) {
        i += 1;
    }
    i
}

/// Append or replace a query parameter.
pub fn with_query(url: &str, key: &str, value: &str) -> Option<String> {
    let mut parsed = Url::parse(url).ok()?;
    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| k != key)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    {
        let mut pairs = parsed.query_pairs_mut();
        pairs.clear();
        for (k, v) in &kept {
            pairs.append_pair(k, v);
        }
        pairs.append_pair(key, value);
    }
    Some(parsed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    fn flat(html: &str) -> FlatText {
        flatten(Html::parse_fragment(html).root_element())
    }

    #[test]
    fn test_flatten_text_skips_scripts() {
        let f = flat("<div><h3>Lamp &amp; Shade</h3>\n<script>var x = 1;</script><style>p{}</style><p>Bid:&nbsp;<b>$5</b></p></div>");
        assert_eq!(f.text, "Lamp & Shade Bid: $5");
        assert_eq!(f.headings.len(), 1);
        assert_eq!(f.headings[0].label, "Lamp & Shade");
    }

    #[test]
    fn test_named_and_numeric_entities_decode() {
        let f = flat("<p>Caf&eacute; Table &mdash; It&#39;s &#x41;&#66;</p>");
        assert_eq!(f.text, "Café Table — It's AB");
    }

    #[test]
    fn test_markers_carry_offsets_and_labels() {
        let f = flat(r#"<p>Intro</p><a href=" /item/1 ">Drill <b>Kit</b></a><img data-src="/p/1.jpg" src="/img/blank.gif" alt="Drill photo"><a href="">x</a>"#);
        assert_eq!(f.links.len(), 1);
        assert_eq!(f.links[0].value, "/item/1");
        assert_eq!(f.links[0].label, "Drill Kit");
        assert_eq!(f.slice(f.links[0].offset, f.text.len()), "Drill Kit x");
        assert_eq!(f.images[0].value, "/p/1.jpg");
        assert_eq!(f.images[0].label, "Drill photo");
    }

    #[test]
    fn test_image_source_skips_placeholders() {
        let f = flat(r#"<img src="/static/logo.png"><img src="/icons/x.svg" data-lazy=""><img src="/a.jpg">"#);
        let sources: Vec<&str> = f.images.iter().map(|m| m.value.as_str()).collect();
        assert_eq!(sources, vec!["/a.jpg"]);
    }

    #[test]
    fn test_absolutize() {
        let base = "https://auctions.example.com/auction/77";
        assert_eq!(
            absolutize(base, "/item/12").as_deref(),
            Some("https://auctions.example.com/item/12")
        );
        assert_eq!(
            absolutize(base, "https://cdn.example.com/a.jpg").as_deref(),
            Some("https://cdn.example.com/a.jpg")
        );
        assert_eq!(absolutize(base, "#top"), None);
        assert_eq!(absolutize(base, "javascript:void(0)"), None);
    }

    #[test]
    fn test_char_boundaries() {
        let s = "a€b"; // '€' is 3 bytes at 1..4
        assert_eq!(floor_boundary(s, 2), 1);
        assert_eq!(ceil_boundary(s, 2), 4);
        assert_eq!(floor_boundary(s, 100), s.len());
    }

    #[test]
    fn test_with_query() {
        assert_eq!(
            with_query("https://a.example/auction/5", "page", "2").as_deref(),
            Some("https://a.example/auction/5?page=2")
        );
        assert_eq!(
            with_query("https://a.example/auction/5?showall=1&page=2", "page", "3").as_deref(),
            Some("https://a.example/auction/5?showall=1&page=3")
        );
    }
}
