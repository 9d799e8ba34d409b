//! In-memory model of the host page: head scripts, addressable elements,
//! executed scripts and host-provided globals.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::Serialize;

/// Id of the page body element.
pub const BODY_ID: &str = "body";

/// A detached element, e.g. a `<script>` about to be appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Element {
    pub tag: String,
    /// Attributes in insertion order. Setting an existing name overwrites it.
    pub attributes: Vec<(String, String)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Element {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            attributes: Vec::new(),
            text: None,
        }
    }

    /// Shorthand for `Element::new("script")`.
    pub fn script() -> Self {
        Self::new("script")
    }

    pub fn set_attribute(&mut self, name: &str, value: &str) {
        match self.attributes.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = value.to_string(),
            None => self.attributes.push((name.to_string(), value.to_string())),
        }
    }

    pub fn with_attribute(mut self, name: &str, value: &str) -> Self {
        self.set_attribute(name, value);
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = Some(text.to_string());
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn id(&self) -> Option<&str> {
        self.attribute("id")
    }
}

/// State of an element that lives in the body and is addressed by id.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NodeState {
    pub classes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "innerHtml")]
    pub inner_html: Option<String>,
    pub visible: bool,
}

/// A script that was rebuilt inside a container and therefore ran.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutedScript {
    pub container: String,
    pub element: Element,
}

#[derive(Default)]
struct DocumentInner {
    head: Vec<Element>,
    nodes: HashMap<String, NodeState>,
    executed: Vec<ExecutedScript>,
    /// Host globals and the argument lists they were invoked with.
    globals: HashMap<String, Vec<Vec<String>>>,
}

/// The page document. One per page view, shared through `Arc`.
#[derive(Default)]
pub struct Document {
    inner: RwLock<DocumentInner>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    // ---------------------------------------------------------------
    // Lookup
    // ---------------------------------------------------------------

    /// Whether any head element or body node carries this id.
    pub fn contains_id(&self, id: &str) -> bool {
        let inner = self.inner.read();
        inner.nodes.contains_key(id) || inner.head.iter().any(|e| e.id() == Some(id))
    }

    /// Number of head elements carrying this id.
    pub fn count_id(&self, id: &str) -> usize {
        self.inner
            .read()
            .head
            .iter()
            .filter(|e| e.id() == Some(id))
            .count()
    }

    pub fn head(&self) -> Vec<Element> {
        self.inner.read().head.clone()
    }

    pub fn append_to_head(&self, element: Element) {
        self.inner.write().head.push(element);
    }

    // ---------------------------------------------------------------
    // Body nodes
    // ---------------------------------------------------------------

    /// Register a node. Re-registering an id resets its state.
    pub fn insert_node(&self, id: &str, classes: &[&str], visible: bool) {
        self.inner.write().nodes.insert(
            id.to_string(),
            NodeState {
                classes: classes.iter().map(|c| c.to_string()).collect(),
                inner_html: None,
                visible,
            },
        );
    }

    pub fn node(&self, id: &str) -> Option<NodeState> {
        self.inner.read().nodes.get(id).cloned()
    }

    /// Add a class. Returns `false` if the node is unknown or already has it.
    pub fn add_class(&self, id: &str, class: &str) -> bool {
        let mut inner = self.inner.write();
        match inner.nodes.get_mut(id) {
            Some(node) if !node.classes.iter().any(|c| c == class) => {
                node.classes.push(class.to_string());
                true
            }
            _ => false,
        }
    }

    /// Remove a class. Returns `false` if nothing changed.
    pub fn remove_class(&self, id: &str, class: &str) -> bool {
        let mut inner = self.inner.write();
        match inner.nodes.get_mut(id) {
            Some(node) => {
                let before = node.classes.len();
                node.classes.retain(|c| c != class);
                node.classes.len() != before
            }
            None => false,
        }
    }

    pub fn has_class(&self, id: &str, class: &str) -> bool {
        self.inner
            .read()
            .nodes
            .get(id)
            .map(|n| n.classes.iter().any(|c| c == class))
            .unwrap_or(false)
    }

    pub fn set_inner_html(&self, id: &str, html: &str) -> bool {
        match self.inner.write().nodes.get_mut(id) {
            Some(node) => {
                node.inner_html = Some(html.to_string());
                true
            }
            None => false,
        }
    }

    pub fn set_visible(&self, id: &str, visible: bool) -> bool {
        match self.inner.write().nodes.get_mut(id) {
            Some(node) => {
                node.visible = visible;
                true
            }
            None => false,
        }
    }

    pub fn is_visible(&self, id: &str) -> bool {
        self.inner
            .read()
            .nodes
            .get(id)
            .map(|n| n.visible)
            .unwrap_or(false)
    }

    // ---------------------------------------------------------------
    // Script execution and host globals
    // ---------------------------------------------------------------

    /// Insert a freshly built script into a container, which runs it.
    pub fn execute_script(&self, container: &str, element: Element) {
        self.inner.write().executed.push(ExecutedScript {
            container: container.to_string(),
            element,
        });
    }

    pub fn executed_scripts(&self) -> Vec<ExecutedScript> {
        self.inner.read().executed.clone()
    }

    /// Make a host global (e.g. a vendor entry point function) available.
    pub fn define_global(&self, name: &str) {
        self.inner
            .write()
            .globals
            .entry(name.to_string())
            .or_default();
    }

    pub fn has_global(&self, name: &str) -> bool {
        self.inner.read().globals.contains_key(name)
    }

    /// Call a host global. Returns `false` if it is not defined.
    pub fn invoke_global(&self, name: &str, args: &[&str]) -> bool {
        match self.inner.write().globals.get_mut(name) {
            Some(calls) => {
                calls.push(args.iter().map(|a| a.to_string()).collect());
                true
            }
            None => false,
        }
    }

    pub fn global_calls(&self, name: &str) -> Vec<Vec<String>> {
        self.inner
            .read()
            .globals
            .get(name)
            .cloned()
            .unwrap_or_default()
    }
}
