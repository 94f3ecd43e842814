//! Reference-list parser
//!
//! Parses the nested arrays of indirect references used by optional
//! content configurations (`Order`, `ON`, `OFF`, `OCGs`, `Locked`) into an
//! arena tree that can be edited and re-serialized deterministically.
//!
//! Grammar:
//! ```text
//! list      = "[" (reference | list | atom | ws)* "]"
//! reference = digits ws+ digits ws+ "R"
//! atom      = "(" string ")" | "<" hex ">" | other
//! ```
//!
//! A list that directly follows a reference at the same level holds that
//! reference's children, so `[1 0 R [2 0 R] 3 0 R]` makes `2` a child of `1`.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Indirect object reference (`<id> <generation> R`)
///
/// Equality and hashing use `id` only; generation is carried for syntax.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Reference {
    pub id: u32,
    pub generation: u16,
}

impl Reference {
    pub const fn new(id: u32) -> Self {
        Self { id, generation: 0 }
    }

    pub const fn with_generation(id: u32, generation: u16) -> Self {
        Self { id, generation }
    }
}

impl PartialEq for Reference {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Reference {}

impl Hash for Reference {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl From<u32> for Reference {
    fn from(id: u32) -> Self {
        Self::new(id)
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} R", self.id, self.generation)
    }
}

/// One reference encountered while scanning an ordering list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderNode {
    pub reference: Reference,
    /// 0 for the outermost level
    pub depth: usize,
    /// Reference preceding the enclosing group, if any
    pub parent: Option<Reference>,
    /// Scan-order index (left-to-right, depth-first)
    pub display_order: usize,
}

/// Index of a list node inside a [`RefList`] arena
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeId(usize);

const ROOT: NodeId = NodeId(0);

/// Deepest group nesting kept by [`RefList::parse`]
pub const MAX_DEPTH: usize = 256;

/// Entry of a list node
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    Ref(Reference),
    List(NodeId),
    /// Opaque token kept verbatim (string labels, names, stray numbers)
    Atom(String),
}

#[derive(Debug, Clone, Default)]
struct ListNode {
    parent: Option<NodeId>,
    entries: Vec<Entry>,
}

/// Parsed reference list
///
/// Node 0 is the outermost list. Nodes detached by edits stay in the arena
/// but are unreachable from the root and never serialized.
#[derive(Debug, Clone)]
pub struct RefList {
    nodes: Vec<ListNode>,
}

impl Default for RefList {
    fn default() -> Self {
        Self::new()
    }
}

impl RefList {
    /// Empty list (`[]`)
    pub fn new() -> Self {
        Self {
            nodes: vec![ListNode::default()],
        }
    }

    /// Flat list of references
    pub fn from_refs<I: IntoIterator<Item = Reference>>(refs: I) -> Self {
        let mut list = Self::new();
        for reference in refs {
            list.push(reference);
        }
        list
    }

    /// Parse a structural array.
    ///
    /// Never fails: unbalanced `[` are closed at end of input, stray `]` at
    /// the outermost level are skipped, and anything that is not a
    /// reference or a bracket is kept as an atom. Groups nested deeper than
    /// [`MAX_DEPTH`] are flattened into their enclosing group.
    pub fn parse(input: &str) -> Self {
        let mut list = Self::new();
        let mut current = ROOT;
        let mut depth = 0;
        // Brackets opened past the depth limit
        let mut flattened = 0usize;

        for token in Lexer::new(strip_outer(input.trim())) {
            match token {
                Token::Open if depth >= MAX_DEPTH => flattened += 1,
                Token::Open => {
                    let child = list.alloc(Some(current));
                    list.nodes[current.0].entries.push(Entry::List(child));
                    current = child;
                    depth += 1;
                }
                Token::Close if flattened > 0 => flattened -= 1,
                Token::Close => {
                    if let Some(parent) = list.nodes[current.0].parent {
                        current = parent;
                        depth -= 1;
                    }
                }
                Token::Ref(reference) => {
                    list.nodes[current.0].entries.push(Entry::Ref(reference));
                }
                Token::Atom(atom) => {
                    list.nodes[current.0]
                        .entries
                        .push(Entry::Atom(atom.to_string()));
                }
            }
        }

        list
    }

    fn alloc(&mut self, parent: Option<NodeId>) -> NodeId {
        self.nodes.push(ListNode {
            parent,
            entries: Vec::new(),
        });
        NodeId(self.nodes.len() - 1)
    }

    /// Entries of a list node
    pub fn entries(&self, node: NodeId) -> &[Entry] {
        &self.nodes[node.0].entries
    }

    /// Outermost list node
    pub fn root(&self) -> NodeId {
        ROOT
    }

    /// True when the outermost list has no entries
    pub fn is_empty(&self) -> bool {
        self.nodes[ROOT.0].entries.is_empty()
    }

    /// Depth-first, left-to-right scan of every reachable reference
    pub fn scan(&self) -> Vec<OrderNode> {
        let mut out = Vec::new();
        self.scan_list(ROOT, 0, None, &mut out);
        out
    }

    fn scan_list(
        &self,
        node: NodeId,
        depth: usize,
        parent: Option<Reference>,
        out: &mut Vec<OrderNode>,
    ) {
        let mut last = None;
        for entry in &self.nodes[node.0].entries {
            match entry {
                Entry::Ref(reference) => {
                    out.push(OrderNode {
                        reference: *reference,
                        depth,
                        parent,
                        display_order: out.len(),
                    });
                    last = Some(*reference);
                }
                Entry::List(child) => self.scan_list(*child, depth + 1, last, out),
                Entry::Atom(_) => {}
            }
        }
    }

    /// All reachable references in scan order
    pub fn refs(&self) -> Vec<Reference> {
        self.scan().into_iter().map(|node| node.reference).collect()
    }

    /// Whether `reference` occurs at any depth
    pub fn contains(&self, reference: Reference) -> bool {
        self.find(reference).is_some()
    }

    /// Append a reference to the outermost list
    pub fn push(&mut self, reference: Reference) {
        self.nodes[ROOT.0].entries.push(Entry::Ref(reference));
    }

    /// First occurrence in pre-order: (containing node, entry index)
    fn find(&self, reference: Reference) -> Option<(NodeId, usize)> {
        self.find_in(ROOT, reference)
    }

    fn find_in(&self, node: NodeId, reference: Reference) -> Option<(NodeId, usize)> {
        for (idx, entry) in self.nodes[node.0].entries.iter().enumerate() {
            match entry {
                Entry::Ref(r) if *r == reference => return Some((node, idx)),
                Entry::List(child) => {
                    if let Some(found) = self.find_in(*child, reference) {
                        return Some(found);
                    }
                }
                _ => {}
            }
        }
        None
    }

    /// Remove the first occurrence of `reference` at the outermost level.
    ///
    /// Nested occurrences are left alone. Returns whether one was removed.
    pub fn remove_first_at_root(&mut self, reference: Reference) -> bool {
        let entries = &mut self.nodes[ROOT.0].entries;
        match entries
            .iter()
            .position(|entry| matches!(entry, Entry::Ref(r) if *r == reference))
        {
            Some(idx) => {
                entries.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Place `child` under `parent`.
    ///
    /// If the entry after `parent` is a group, `child` is appended to it;
    /// otherwise a new `[child]` group is inserted right after `parent`.
    /// Returns `false` (leaving the list untouched) when `parent` is absent.
    pub fn insert_child(&mut self, parent: Reference, child: Reference) -> bool {
        let Some((node, idx)) = self.find(parent) else {
            return false;
        };

        match self.nodes[node.0].entries.get(idx + 1) {
            Some(Entry::List(group)) => {
                let group = *group;
                self.nodes[group.0].entries.push(Entry::Ref(child));
            }
            _ => {
                let group = self.alloc(Some(node));
                self.nodes[group.0].entries.push(Entry::Ref(child));
                self.nodes[node.0].entries.insert(idx + 1, Entry::List(group));
            }
        }
        true
    }

    /// Remove every occurrence of `reference` at any depth.
    ///
    /// Groups emptied by the removal are dropped with it. Returns the
    /// number of references removed.
    pub fn remove_all(&mut self, reference: Reference) -> usize {
        self.remove_in(ROOT, reference)
    }

    fn remove_in(&mut self, node: NodeId, reference: Reference) -> usize {
        let entries = std::mem::take(&mut self.nodes[node.0].entries);
        let mut kept = Vec::with_capacity(entries.len());
        let mut removed = 0;

        for entry in entries {
            match entry {
                Entry::Ref(r) if r == reference => removed += 1,
                Entry::List(child) => {
                    let inner = self.remove_in(child, reference);
                    removed += inner;
                    if inner == 0 || !self.nodes[child.0].entries.is_empty() {
                        kept.push(Entry::List(child));
                    }
                }
                other => kept.push(other),
            }
        }

        self.nodes[node.0].entries = kept;
        removed
    }

    fn write_list(&self, node: NodeId, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (idx, entry) in self.nodes[node.0].entries.iter().enumerate() {
            if idx > 0 {
                f.write_str(" ")?;
            }
            match entry {
                Entry::Ref(reference) => write!(f, "{reference}")?,
                Entry::List(child) => self.write_list(*child, f)?,
                Entry::Atom(atom) => f.write_str(atom)?,
            }
        }
        f.write_str("]")
    }
}

impl fmt::Display for RefList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_list(ROOT, f)
    }
}

/// Scan an ordering array string
pub fn scan_order(input: &str) -> Vec<OrderNode> {
    RefList::parse(input).scan()
}

/// First `<id> <generation> R` anywhere in `text`
pub fn find_reference(text: &str) -> Option<Reference> {
    let bytes = text.as_bytes();
    (0..bytes.len())
        .filter(|&pos| bytes[pos].is_ascii_digit())
        .find_map(|pos| match_reference(bytes, pos).map(|(reference, _)| reference))
}

/// Strip exactly one enclosing `[` ... `]` pair
fn strip_outer(input: &str) -> &str {
    if input.len() >= 2 && input.starts_with('[') && input.ends_with(']') {
        &input[1..input.len() - 1]
    } else {
        input
    }
}

fn is_space(byte: u8) -> bool {
    byte.is_ascii_whitespace() || byte == 0
}

fn is_delimiter(byte: u8) -> bool {
    matches!(byte, b'[' | b']' | b'(' | b')' | b'<' | b'>' | b'/' | b'%')
}

fn skip_digits(bytes: &[u8], mut pos: usize) -> usize {
    while pos < bytes.len() && bytes[pos].is_ascii_digit() {
        pos += 1;
    }
    pos
}

fn skip_spaces(bytes: &[u8], mut pos: usize) -> usize {
    while pos < bytes.len() && is_space(bytes[pos]) {
        pos += 1;
    }
    pos
}

/// Match `digits ws+ digits ws+ R` at `start`; returns the reference and the end offset
fn match_reference(bytes: &[u8], start: usize) -> Option<(Reference, usize)> {
    let id_end = skip_digits(bytes, start);
    if id_end == start {
        return None;
    }
    let gen_start = skip_spaces(bytes, id_end);
    if gen_start == id_end {
        return None;
    }
    let gen_end = skip_digits(bytes, gen_start);
    if gen_end == gen_start {
        return None;
    }
    let r_pos = skip_spaces(bytes, gen_end);
    if r_pos == gen_end || bytes.get(r_pos) != Some(&b'R') {
        return None;
    }

    let id = std::str::from_utf8(&bytes[start..id_end]).ok()?.parse().ok()?;
    let generation = std::str::from_utf8(&bytes[gen_start..gen_end])
        .ok()?
        .parse()
        .ok()?;
    Some((Reference::with_generation(id, generation), r_pos + 1))
}

#[derive(Debug, PartialEq)]
enum Token<'a> {
    Open,
    Close,
    Ref(Reference),
    Atom(&'a str),
}

/// Tokenizer state
struct Lexer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn bytes(&self) -> &'a [u8] {
        self.input.as_bytes()
    }

    /// `( ... )` with nesting and backslash escapes; unterminated runs to the end
    fn string_literal(&mut self) -> &'a str {
        let bytes = self.bytes();
        let start = self.pos;
        let mut depth = 0usize;
        while self.pos < bytes.len() {
            match bytes[self.pos] {
                b'\\' => self.pos += 1,
                b'(' => depth += 1,
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        self.pos += 1;
                        break;
                    }
                }
                _ => {}
            }
            self.pos += 1;
        }
        self.pos = self.pos.min(bytes.len());
        &self.input[start..self.pos]
    }

    fn hex_literal(&mut self) -> &'a str {
        let bytes = self.bytes();
        let start = self.pos;
        while self.pos < bytes.len() && bytes[self.pos] != b'>' {
            self.pos += 1;
        }
        self.pos = (self.pos + 1).min(bytes.len());
        &self.input[start..self.pos]
    }

    fn bare_atom(&mut self) -> &'a str {
        let bytes = self.bytes();
        let start = self.pos;
        self.pos += 1;
        while self.pos < bytes.len() && !is_space(bytes[self.pos]) && !is_delimiter(bytes[self.pos])
        {
            self.pos += 1;
        }
        &self.input[start..self.pos]
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Token<'a>> {
        let bytes = self.bytes();
        self.pos = skip_spaces(bytes, self.pos);
        let byte = *bytes.get(self.pos)?;

        let token = match byte {
            b'[' => {
                self.pos += 1;
                Token::Open
            }
            b']' => {
                self.pos += 1;
                Token::Close
            }
            b'(' => Token::Atom(self.string_literal()),
            b'<' => Token::Atom(self.hex_literal()),
            b if b.is_ascii_digit() => match match_reference(bytes, self.pos) {
                Some((reference, end)) => {
                    self.pos = end;
                    Token::Ref(reference)
                }
                None => Token::Atom(self.bare_atom()),
            },
            _ => Token::Atom(self.bare_atom()),
        };
        Some(token)
    }
}
