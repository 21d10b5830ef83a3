use crate::text::to_word_pattern;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

pub const MARK_TAG: &str = "mark";
pub const MARK_ATTR: &str = "data-pagegloss";
pub const WORD_ATTR: &str = "data-word";

/// Containers whose text must never be rewritten: form controls, code
/// blocks, and script-bearing elements.
static SKIP_TAGS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "script", "style", "noscript", "textarea", "input", "select", "option", "code", "pre",
    ]
    .into_iter()
    .collect()
});

/// A minimal page tree the highlighter rewrites in place. Markers are
/// ordinary elements distinguished by [`MARK_ATTR`].
#[derive(Debug, Clone, PartialEq)]
pub enum PageNode {
    Element(ElementNode),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElementNode {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<PageNode>,
}

impl ElementNode {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_lowercase(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    fn is_marker(&self) -> bool {
        self.tag == MARK_TAG && self.attr(MARK_ATTR).is_some()
    }

    fn is_skipped(&self) -> bool {
        SKIP_TAGS.contains(self.tag.as_str())
            || self.attr("hidden").is_some()
            || self.attr("style").is_some_and(style_hides)
    }

    /// Concatenated text of this subtree.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out
    }
}

/// Inline-style check for the two hiding declarations that matter here.
fn style_hides(style: &str) -> bool {
    style.split(';').any(|declaration| {
        let mut parts = declaration.splitn(2, ':');
        let (Some(name), Some(value)) = (parts.next(), parts.next()) else {
            return false;
        };
        let name = name.trim().to_ascii_lowercase();
        let value = value.trim().to_ascii_lowercase();
        (name == "display" && value == "none")
            || (name == "visibility" && value == "hidden")
    })
}

fn collect_text(children: &[PageNode], out: &mut String) {
    for child in children {
        match child {
            PageNode::Text(text) => out.push_str(text),
            PageNode::Element(el) => collect_text(&el.children, out),
        }
    }
}

fn marker(word: &str, matched: &str) -> PageNode {
    PageNode::Element(ElementNode {
        tag: MARK_TAG.to_string(),
        attrs: vec![
            (MARK_ATTR.to_string(), "1".to_string()),
            (WORD_ATTR.to_string(), word.to_lowercase()),
        ],
        children: vec![PageNode::Text(matched.to_string())],
    })
}

/// Wrap every whole-word occurrence of the given words in marker
/// elements. Matching is case-insensitive and word-boundary anchored;
/// overlapping candidates are resolved leftmost-first, earlier pattern
/// winning ties, so nested marks never occur.
pub fn highlight_words(root: &mut ElementNode, words: &[String]) -> usize {
    let patterns: Vec<(String, Regex)> = words
        .iter()
        .filter_map(|w| to_word_pattern(w).map(|re| (w.to_lowercase(), re)))
        .collect();
    if patterns.is_empty() {
        return 0;
    }
    highlight_children(root, &patterns)
}

fn highlight_children(element: &mut ElementNode, patterns: &[(String, Regex)]) -> usize {
    if element.is_skipped() || element.is_marker() {
        return 0;
    }
    let mut marked = 0;
    let mut rebuilt: Vec<PageNode> = Vec::with_capacity(element.children.len());
    for child in element.children.drain(..) {
        match child {
            PageNode::Element(mut el) => {
                marked += highlight_children(&mut el, patterns);
                rebuilt.push(PageNode::Element(el));
            }
            PageNode::Text(text) => {
                let segments = split_matches(&text, patterns);
                marked += segments
                    .iter()
                    .filter(|s| matches!(s, PageNode::Element(_)))
                    .count();
                rebuilt.extend(segments);
            }
        }
    }
    element.children = rebuilt;
    marked
}

/// Split a text run into plain-text and marker segments. Matches from
/// all patterns are gathered first, then reduced to a non-overlapping
/// set by span start.
fn split_matches(text: &str, patterns: &[(String, Regex)]) -> Vec<PageNode> {
    let mut candidates: Vec<(usize, usize, usize)> = Vec::new();
    for (index, (_, re)) in patterns.iter().enumerate() {
        for m in re.find_iter(text) {
            candidates.push((m.start(), m.end(), index));
        }
    }
    if candidates.is_empty() {
        return vec![PageNode::Text(text.to_string())];
    }
    candidates.sort_by(|a, b| a.0.cmp(&b.0).then(a.2.cmp(&b.2)).then(b.1.cmp(&a.1)));

    let mut out = Vec::new();
    let mut cursor = 0usize;
    for (start, end, index) in candidates {
        if start < cursor {
            continue;
        }
        if start > cursor {
            out.push(PageNode::Text(text[cursor..start].to_string()));
        }
        out.push(marker(&patterns[index].0, &text[start..end]));
        cursor = end;
    }
    if cursor < text.len() {
        out.push(PageNode::Text(text[cursor..].to_string()));
    }
    out
}

/// Remove every marker in the subtree, splicing its text back in and
/// merging adjacent text runs so repeated passes leave the tree stable.
pub fn clear_highlights(root: &mut ElementNode) {
    let mut rebuilt: Vec<PageNode> = Vec::with_capacity(root.children.len());
    for child in root.children.drain(..) {
        match child {
            PageNode::Element(el) if el.is_marker() => {
                push_text(&mut rebuilt, &el.text_content());
            }
            PageNode::Element(mut el) => {
                clear_highlights(&mut el);
                rebuilt.push(PageNode::Element(el));
            }
            PageNode::Text(text) => push_text(&mut rebuilt, &text),
        }
    }
    root.children = rebuilt;
}

fn push_text(out: &mut Vec<PageNode>, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(PageNode::Text(prev)) = out.last_mut() {
        prev.push_str(text);
    } else {
        out.push(PageNode::Text(text.to_string()));
    }
}

/// Enumerate markers in document order as (word, visible text) pairs.
pub fn collect_marks(root: &ElementNode) -> Vec<(String, String)> {
    let mut out = Vec::new();
    collect_marks_into(root, &mut out);
    out
}

fn collect_marks_into(element: &ElementNode, out: &mut Vec<(String, String)>) {
    for child in &element.children {
        if let PageNode::Element(el) = child {
            if el.is_marker() {
                if let Some(word) = el.attr(WORD_ATTR) {
                    out.push((word.to_string(), el.text_content()));
                }
            } else {
                collect_marks_into(el, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(children: Vec<PageNode>) -> ElementNode {
        let mut el = ElementNode::new("body");
        el.children = children;
        el
    }

    fn words(list: &[&str]) -> Vec<String> {
        list.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn highlights_whole_words_only() {
        let mut root = body(vec![PageNode::Text("I run and he runs.".to_string())]);
        let marked = highlight_words(&mut root, &words(&["run"]));
        assert_eq!(marked, 1);
        let marks = collect_marks(&root);
        assert_eq!(marks, vec![("run".to_string(), "run".to_string())]);
        assert_eq!(root.text_content(), "I run and he runs.");
    }

    #[test]
    fn matching_is_case_insensitive_and_preserves_original_casing() {
        let mut root = body(vec![PageNode::Text("Run, RUN, run!".to_string())]);
        let marked = highlight_words(&mut root, &words(&["run"]));
        assert_eq!(marked, 3);
        let marks = collect_marks(&root);
        assert_eq!(marks[0].1, "Run");
        assert_eq!(marks[1].1, "RUN");
        assert!(marks.iter().all(|(word, _)| word == "run"));
    }

    #[test]
    fn overlapping_words_resolve_leftmost_longest_first() {
        let mut root = body(vec![PageNode::Text("We visited New York today.".to_string())]);
        let marked = highlight_words(&mut root, &words(&["New York", "York"]));
        assert_eq!(marked, 1);
        let marks = collect_marks(&root);
        assert_eq!(marks, vec![("new york".to_string(), "New York".to_string())]);
    }

    #[test]
    fn skip_containers_are_left_untouched() {
        let mut code = ElementNode::new("code");
        code.children = vec![PageNode::Text("run the tests".to_string())];
        let mut root = body(vec![
            PageNode::Element(code),
            PageNode::Text("run outside".to_string()),
        ]);
        let marked = highlight_words(&mut root, &words(&["run"]));
        assert_eq!(marked, 1);
    }

    #[test]
    fn hidden_elements_are_skipped() {
        let mut hidden = ElementNode::new("div");
        hidden.attrs.push(("hidden".to_string(), String::new()));
        hidden.children = vec![PageNode::Text("run away".to_string())];
        let mut root = body(vec![PageNode::Element(hidden)]);
        assert_eq!(highlight_words(&mut root, &words(&["run"])), 0);
    }

    #[test]
    fn style_hidden_elements_are_skipped() {
        for style in [
            "display:none",
            "display: NONE;",
            "color: red; visibility: hidden",
        ] {
            let mut hidden = ElementNode::new("div");
            hidden.attrs.push(("style".to_string(), style.to_string()));
            hidden.children = vec![PageNode::Text("run away".to_string())];
            let mut root = body(vec![PageNode::Element(hidden)]);
            assert_eq!(highlight_words(&mut root, &words(&["run"])), 0, "{style}");
        }

        let mut visible = ElementNode::new("div");
        visible.attrs.push(("style".to_string(), "display:block".to_string()));
        visible.children = vec![PageNode::Text("run away".to_string())];
        let mut root = body(vec![PageNode::Element(visible)]);
        assert_eq!(highlight_words(&mut root, &words(&["run"])), 1);
    }

    #[test]
    fn existing_marks_are_never_nested() {
        let mut root = body(vec![PageNode::Text("run and run".to_string())]);
        highlight_words(&mut root, &words(&["run"]));
        let marked_again = highlight_words(&mut root, &words(&["run"]));
        assert_eq!(marked_again, 0);
        assert_eq!(collect_marks(&root).len(), 2);
    }

    #[test]
    fn clear_restores_merged_text() {
        let original = "I run and he runs.";
        let mut root = body(vec![PageNode::Text(original.to_string())]);
        highlight_words(&mut root, &words(&["run", "runs"]));
        assert_eq!(collect_marks(&root).len(), 2);
        clear_highlights(&mut root);
        assert_eq!(root.children, vec![PageNode::Text(original.to_string())]);
    }

    #[test]
    fn markers_carry_lowercase_word_attribute() {
        let mut root = body(vec![PageNode::Text("Tokyo".to_string())]);
        highlight_words(&mut root, &words(&["Tokyo"]));
        let marks = collect_marks(&root);
        assert_eq!(marks[0].0, "tokyo");
    }
}
