//! Owned XML tree.
//!
//! Elements parsed from a source remember where they came from, so callers
//! can splice new markup into the original bytes and leave untouched
//! regions byte-identical.

/// Child-index path from a list of root nodes down to a node.
pub type NodePath = Vec<usize>;

/// Byte offsets of an element in the source it was parsed from.
///
/// For empty elements (`<X/>`) the content range is empty and sits at `end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    /// Offset of the opening `<`.
    pub start: usize,
    /// Offset just after the start tag.
    pub content_start: usize,
    /// Offset of the end tag's `<`.
    pub content_end: usize,
    /// Offset just after the end tag.
    pub end: usize,
}

impl Span {
    pub fn is_self_closing(&self) -> bool {
        self.content_start == self.end
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

impl Node {
    pub fn text(text: impl Into<String>) -> Self {
        Node::Text(text.into())
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        }
    }

    pub fn as_element_mut(&mut self) -> Option<&mut Element> {
        match self {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Node::Text(t) => Some(t),
            Node::Element(_) => None,
        }
    }

    /// Whether this is a text node made only of whitespace.
    pub fn is_blank_text(&self) -> bool {
        matches!(self, Node::Text(t) if t.trim().is_empty())
    }

    /// Whether this is an element with the given name.
    pub fn is_element(&self, name: &str) -> bool {
        matches!(self, Node::Element(el) if el.name == name)
    }
}

impl From<Element> for Node {
    fn from(el: Element) -> Self {
        Node::Element(el)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<Attribute>,
    pub children: Vec<Node>,
    pub span: Option<Span>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.set_attr(name, value);
        self
    }

    pub fn with_child(mut self, child: impl Into<Node>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(Node::Text(text.into()));
        self
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attributes.iter().any(|a| a.name == name)
    }

    /// Sets an attribute, keeping its position if it already exists.
    pub fn set_attr(&mut self, name: impl Into<String>, value: impl ToString) {
        let name = name.into();
        let value = value.to_string();
        match self.attributes.iter_mut().find(|a| a.name == name) {
            Some(existing) => existing.value = value,
            None => self.attributes.push(Attribute { name, value }),
        }
    }

    pub fn set_attr_if_missing(&mut self, name: &str, value: impl ToString) {
        if !self.has_attr(name) {
            self.set_attr(name, value);
        }
    }

    pub fn remove_attr(&mut self, name: &str) -> Option<String> {
        let index = self.attributes.iter().position(|a| a.name == name)?;
        Some(self.attributes.remove(index).value)
    }

    /// Element children, skipping text.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(Node::as_element)
    }

    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.children.iter_mut().filter_map(Node::as_element_mut)
    }

    /// First child element with the given name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.elements().find(|el| el.name == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut Element> {
        self.elements_mut().find(|el| el.name == name)
    }

    /// Index in `children` of the first child element with the given name.
    pub fn child_index(&self, name: &str) -> Option<usize> {
        self.children.iter().position(|n| n.is_element(name))
    }

    /// Concatenated text of the whole subtree.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out
    }

    /// Whether the subtree contains an element with the given name.
    pub fn contains_element(&self, name: &str) -> bool {
        self.elements()
            .any(|el| el.name == name || el.contains_element(name))
    }

    /// Visits every element of the subtree (self included) in document order.
    pub fn visit<'a>(&'a self, f: &mut impl FnMut(&'a Element)) {
        f(self);
        for child in self.elements() {
            child.visit(f);
        }
    }

    pub fn visit_mut(&mut self, f: &mut impl FnMut(&mut Element)) {
        f(self);
        for child in self.elements_mut() {
            child.visit_mut(f);
        }
    }

    /// Element at a child-index path below this element.
    pub fn at_path(&self, path: &[usize]) -> Option<&Element> {
        match path.split_first() {
            None => Some(self),
            Some((first, rest)) => self.children.get(*first)?.as_element()?.at_path(rest),
        }
    }

    pub fn at_path_mut(&mut self, path: &[usize]) -> Option<&mut Element> {
        match path.split_first() {
            None => Some(self),
            Some((first, rest)) => self
                .children
                .get_mut(*first)?
                .as_element_mut()?
                .at_path_mut(rest),
        }
    }

    /// Path to the first descendant element matching `pred`, in document order.
    pub fn find_path(&self, pred: &impl Fn(&Element) -> bool) -> Option<NodePath> {
        for (index, child) in self.children.iter().enumerate() {
            if let Node::Element(el) = child {
                if pred(el) {
                    return Some(vec![index]);
                }
                if let Some(mut rest) = el.find_path(pred) {
                    rest.insert(0, index);
                    return Some(rest);
                }
            }
        }
        None
    }

    /// Drops source positions from the whole subtree.
    pub fn clear_spans(&mut self) {
        self.visit_mut(&mut |el| el.span = None);
    }
}

fn collect_text(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(t) => out.push_str(t),
            Node::Element(el) => collect_text(&el.children, out),
        }
    }
}

/// Element at a path into a list of root nodes.
pub fn element_at<'a>(nodes: &'a [Node], path: &[usize]) -> Option<&'a Element> {
    let (first, rest) = path.split_first()?;
    nodes.get(*first)?.as_element()?.at_path(rest)
}

pub fn element_at_mut<'a>(nodes: &'a mut [Node], path: &[usize]) -> Option<&'a mut Element> {
    let (first, rest) = path.split_first()?;
    nodes.get_mut(*first)?.as_element_mut()?.at_path_mut(rest)
}
