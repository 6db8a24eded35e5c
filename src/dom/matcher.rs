//! Selector parsing and matching for the in-memory document.
//!
//! Supported grammar (a practical subset of CSS selectors):
//!
//! | Form | Example |
//! |------|---------|
//! | Type / universal | `div`, `*` |
//! | ID | `#cart` |
//! | Class | `.item.active` |
//! | Attribute presence | `[hidden]` |
//! | Attribute equality | `[data-variant=b]`, `[type="text"]` |
//! | Descendant / child | `ul li`, `ul > li` |
//! | Selector list | `h1, h2` |

use crate::identifiers::ElementId;

// ============================================================================
// NodeView
// ============================================================================

/// Read access to the tree a selector is matched against.
pub(crate) trait NodeView {
    /// Lowercase tag name of `id`.
    fn tag_name(&self, id: ElementId) -> Option<&str>;

    /// Value of attribute `name` on `id`.
    fn attribute(&self, id: ElementId, name: &str) -> Option<&str>;

    /// Parent element of `id`; `None` for top-level and detached elements.
    fn parent_element(&self, id: ElementId) -> Option<ElementId>;
}

// ============================================================================
// Parsed Selector
// ============================================================================

/// A parsed, comma-separated selector list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SelectorList(Vec<Complex>);

#[derive(Debug, Clone, PartialEq, Eq)]
struct Complex {
    /// Compounds left to right.
    compounds: Vec<Compound>,
    /// `combinators[i]` sits between `compounds[i]` and `compounds[i + 1]`.
    combinators: Vec<Combinator>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attributes: Vec<AttributeTest>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttributeTest {
    name: String,
    value: Option<String>,
}

// ============================================================================
// Matching
// ============================================================================

impl SelectorList {
    /// Parses `input`, returning a human-readable reason on failure.
    pub(crate) fn parse(input: &str) -> Result<Self, String> {
        Parser::new(input).parse_list()
    }

    /// Returns `true` if `element` matches any selector in the list.
    pub(crate) fn matches(&self, view: &impl NodeView, element: ElementId) -> bool {
        self.0.iter().any(|complex| complex.matches(view, element))
    }
}

impl Complex {
    fn matches(&self, view: &impl NodeView, element: ElementId) -> bool {
        self.matches_at(view, element, self.compounds.len() - 1)
    }

    fn matches_at(&self, view: &impl NodeView, element: ElementId, index: usize) -> bool {
        if !self.compounds[index].matches(view, element) {
            return false;
        }
        if index == 0 {
            return true;
        }

        match self.combinators[index - 1] {
            Combinator::Child => view
                .parent_element(element)
                .is_some_and(|parent| self.matches_at(view, parent, index - 1)),
            Combinator::Descendant => {
                let mut ancestor = view.parent_element(element);
                while let Some(current) = ancestor {
                    if self.matches_at(view, current, index - 1) {
                        return true;
                    }
                    ancestor = view.parent_element(current);
                }
                false
            }
        }
    }
}

impl Compound {
    fn matches(&self, view: &impl NodeView, element: ElementId) -> bool {
        let Some(tag) = view.tag_name(element) else {
            return false;
        };

        if self.tag.as_deref().is_some_and(|wanted| wanted != tag) {
            return false;
        }

        if let Some(id) = &self.id
            && view.attribute(element, "id") != Some(id.as_str())
        {
            return false;
        }

        if !self.classes.is_empty() {
            let class_attr = view.attribute(element, "class").unwrap_or_default();
            if !self
                .classes
                .iter()
                .all(|class| class_attr.split_ascii_whitespace().any(|c| c == class))
            {
                return false;
            }
        }

        self.attributes.iter().all(|test| {
            match (view.attribute(element, &test.name), &test.value) {
                (None, _) => false,
                (Some(_), None) => true,
                (Some(actual), Some(expected)) => actual == expected,
            }
        })
    }
}

// ============================================================================
// Parser
// ============================================================================

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn skip_whitespace(&mut self) -> bool {
        let start = self.pos;
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
        self.pos > start
    }

    fn expect(&mut self, wanted: char) -> Result<(), String> {
        match self.bump() {
            Some(c) if c == wanted => Ok(()),
            Some(c) => Err(format!("expected '{wanted}', found '{c}'")),
            None => Err(format!("expected '{wanted}', found end of input")),
        }
    }

    fn parse_list(&mut self) -> Result<SelectorList, String> {
        let mut list = Vec::new();
        loop {
            self.skip_whitespace();
            list.push(self.parse_complex()?);
            self.skip_whitespace();
            match self.bump() {
                None => break,
                Some(',') => continue,
                Some(c) => return Err(format!("unexpected '{c}'")),
            }
        }
        Ok(SelectorList(list))
    }

    fn parse_complex(&mut self) -> Result<Complex, String> {
        let mut compounds = vec![self.parse_compound()?];
        let mut combinators = Vec::new();

        loop {
            let had_space = self.skip_whitespace();
            match self.peek() {
                None | Some(',') => break,
                Some('>') => {
                    self.pos += 1;
                    self.skip_whitespace();
                    combinators.push(Combinator::Child);
                }
                Some(_) if had_space => combinators.push(Combinator::Descendant),
                Some(c) => return Err(format!("unexpected '{c}'")),
            }
            compounds.push(self.parse_compound()?);
        }

        Ok(Complex {
            compounds,
            combinators,
        })
    }

    fn parse_compound(&mut self) -> Result<Compound, String> {
        let mut compound = Compound::default();
        let mut empty = true;

        match self.peek() {
            Some('*') => {
                self.pos += 1;
                empty = false;
            }
            Some(c) if is_ident_char(c) => {
                compound.tag = Some(self.parse_ident()?.to_ascii_lowercase());
                empty = false;
            }
            _ => {}
        }

        loop {
            match self.peek() {
                Some('#') => {
                    self.pos += 1;
                    compound.id = Some(self.parse_ident()?);
                }
                Some('.') => {
                    self.pos += 1;
                    compound.classes.push(self.parse_ident()?);
                }
                Some('[') => {
                    self.pos += 1;
                    compound.attributes.push(self.parse_attribute()?);
                }
                _ => break,
            }
            empty = false;
        }

        if empty {
            return Err(match self.peek() {
                Some(c) => format!("expected selector, found '{c}'"),
                None => "expected selector, found end of input".to_string(),
            });
        }
        Ok(compound)
    }

    fn parse_attribute(&mut self) -> Result<AttributeTest, String> {
        self.skip_whitespace();
        let name = self.parse_ident()?;
        self.skip_whitespace();

        let value = if self.peek() == Some('=') {
            self.pos += 1;
            self.skip_whitespace();
            let value = match self.peek() {
                Some(quote @ ('"' | '\'')) => {
                    self.pos += 1;
                    let start = self.pos;
                    while self.peek().is_some_and(|c| c != quote) {
                        self.pos += 1;
                    }
                    let value: String = self.chars[start..self.pos].iter().collect();
                    self.expect(quote)?;
                    value
                }
                _ => self.parse_ident()?,
            };
            self.skip_whitespace();
            Some(value)
        } else {
            None
        };

        self.expect(']')?;
        Ok(AttributeTest { name, value })
    }

    fn parse_ident(&mut self) -> Result<String, String> {
        let start = self.pos;
        while self.peek().is_some_and(is_ident_char) {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(match self.peek() {
                Some(c) => format!("expected identifier, found '{c}'"),
                None => "expected identifier, found end of input".to_string(),
            });
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_' || !c.is_ascii()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;
    use rustc_hash::FxHashMap;

    /// Flat tree: id -> (tag, attributes, parent).
    #[derive(Default)]
    struct Tree(FxHashMap<ElementId, (String, Vec<(String, String)>, Option<ElementId>)>);

    impl Tree {
        fn add(&mut self, raw: u64, tag: &str, attrs: &[(&str, &str)], parent: Option<u64>) {
            let attrs = attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            self.0.insert(
                ElementId::new(raw),
                (tag.to_string(), attrs, parent.map(ElementId::new)),
            );
        }
    }

    impl NodeView for Tree {
        fn tag_name(&self, id: ElementId) -> Option<&str> {
            self.0.get(&id).map(|(tag, _, _)| tag.as_str())
        }

        fn attribute(&self, id: ElementId, name: &str) -> Option<&str> {
            self.0
                .get(&id)?
                .1
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str())
        }

        fn parent_element(&self, id: ElementId) -> Option<ElementId> {
            self.0.get(&id)?.2
        }
    }

    fn sample() -> Tree {
        let mut tree = Tree::default();
        tree.add(1, "ul", &[("id", "results"), ("class", "list wide")], None);
        tree.add(2, "li", &[("class", "item active")], Some(1));
        tree.add(3, "span", &[("data-price", "10")], Some(2));
        tree.add(4, "div", &[("hidden", "")], None);
        tree
    }

    fn matches(selector: &str, raw: u64) -> bool {
        SelectorList::parse(selector)
            .unwrap()
            .matches(&sample(), ElementId::new(raw))
    }

    #[test]
    fn test_simple_selectors() {
        assert!(matches("ul", 1));
        assert!(matches("UL", 1));
        assert!(matches("*", 4));
        assert!(matches("#results", 1));
        assert!(matches(".item", 2));
        assert!(matches(".item.active", 2));
        assert!(!matches(".item.missing", 2));
        assert!(matches("[hidden]", 4));
        assert!(matches("[data-price=10]", 3));
        assert!(matches("[data-price='10']", 3));
        assert!(!matches("[data-price=\"11\"]", 3));
    }

    #[test]
    fn test_combinators() {
        assert!(matches("ul span", 3));
        assert!(matches("ul > li > span", 3));
        assert!(!matches("ul > span", 3));
        assert!(matches("#results .item span", 3));
        assert!(!matches("div span", 3));
    }

    #[test]
    fn test_selector_list() {
        assert!(matches("div, span", 3));
        assert!(matches("div, span", 4));
        assert!(!matches("div, span", 1));
    }

    #[test]
    fn test_parse_errors() {
        for bad in ["", "div[", "div >", ".", "#", "a,", "div[x=]", "a + b"] {
            assert!(SelectorList::parse(bad).is_err(), "accepted {bad:?}");
        }
    }

    proptest! {
        #[test]
        fn prop_id_selector_matches_only_its_element(id in "[a-z][a-z0-9_-]{0,12}") {
            let mut tree = Tree::default();
            tree.add(1, "div", &[("id", id.as_str())], None);
            tree.add(2, "div", &[("id", "other-element")], None);
            prop_assume!(id != "other-element");

            let selector = SelectorList::parse(&format!("#{id}")).unwrap();
            prop_assert!(selector.matches(&tree, ElementId::new(1)));
            prop_assert!(!selector.matches(&tree, ElementId::new(2)));
        }
    }
}
