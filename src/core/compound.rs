/// Runtime text with inline content markers, for character-level playback.
use crate::core::template::{push_aligned, Placeholder, Segment, Template, MAX_ALIGNMENT};
use crate::schema::content::Arg;

/// Stands in for one content object inside [`CompoundText::text`].
pub const MARKER: char = '\u{FFFC}';

/// One embedded object and the placeholder annotations it was written with.
#[derive(Debug, Clone)]
pub struct Inline {
    pub object: Arg,
    pub alignment: Option<i32>,
    pub format: Option<String>,
}

impl Inline {
    pub fn new(object: Arg) -> Self {
        Self {
            object,
            alignment: None,
            format: None,
        }
    }

    /// Rendered, aligned display text for this object.
    pub fn render(&self) -> String {
        let mut out = String::new();
        push_aligned(
            &mut out,
            &self.object.render(self.format.as_deref()),
            self.alignment,
        );
        out
    }
}

/// A piece of compound text in reading order.
#[derive(Debug, Clone, Copy)]
pub enum Piece<'a> {
    Text(&'a str),
    Content(&'a Inline),
}

/// Mutable text holding one [`MARKER`] per embedded object.
///
/// The n-th marker in `text` always corresponds to `contents[n]`. Indices are
/// byte offsets into `text`.
#[derive(Debug, Clone, Default)]
pub struct CompoundText {
    text: String,
    contents: Vec<Inline>,
}

impl CompoundText {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn contents(&self) -> &[Inline] {
        &self.contents
    }

    /// Offset of the first marker at or after `start`. A `start` inside a
    /// multi-byte character scans from the next character boundary.
    pub fn find_next_marker(&self, start: usize) -> Option<usize> {
        let start = (start..=self.text.len()).find(|&i| self.text.is_char_boundary(i))?;
        self.text[start..].find(MARKER).map(|offset| offset + start)
    }

    /// The content whose marker sits at byte `index`.
    pub fn content_at(&self, index: usize) -> Option<&Inline> {
        if !self.text.get(index..)?.starts_with(MARKER) {
            return None;
        }
        self.contents.get(self.markers_before(index))
    }

    /// Insert `content` with its marker at byte `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is past the end or not on a char boundary.
    pub fn insert(&mut self, index: usize, content: Inline) {
        let position = self.markers_before(index);
        self.text.insert(index, MARKER);
        self.contents.insert(position, content);
    }

    /// Insert plain text at byte `index`. Marker code points in `text` are
    /// dropped.
    ///
    /// # Panics
    ///
    /// Panics if `index` is past the end or not on a char boundary.
    pub fn insert_text(&mut self, index: usize, text: &str) {
        self.text.insert_str(index, &strip_markers(text));
    }

    /// Append plain text. Marker code points in `text` are dropped.
    pub fn push_text(&mut self, text: &str) {
        self.text.push_str(&strip_markers(text));
    }

    pub fn push_content(&mut self, content: Inline) {
        self.text.push(MARKER);
        self.contents.push(content);
    }

    /// Text and content in reading order.
    pub fn pieces(&self) -> Vec<Piece<'_>> {
        let mut pieces = Vec::with_capacity(self.contents.len() * 2 + 1);
        let mut contents = self.contents.iter();
        for (i, part) in self.text.split(MARKER).enumerate() {
            if i > 0 {
                if let Some(content) = contents.next() {
                    pieces.push(Piece::Content(content));
                }
            }
            if !part.is_empty() {
                pieces.push(Piece::Text(part));
            }
        }
        pieces
    }

    /// Display text with every marker replaced by its rendered content.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.text.len());
        for piece in self.pieces() {
            match piece {
                Piece::Text(text) => out.push_str(text),
                Piece::Content(content) => out.push_str(&content.render()),
            }
        }
        out
    }

    /// Rebuild a template with one placeholder per marker, numbered in text
    /// order, using the contents as arguments.
    ///
    /// Format strings cannot carry braces or newlines, and alignments are
    /// limited to [`MAX_ALIGNMENT`]. Host-built contents outside those limits
    /// are written with the offending characters dropped and the alignment
    /// clamped, so the result always re-parses.
    pub fn to_template(&self) -> Template {
        let mut format = String::with_capacity(self.text.len() + self.contents.len() * 3);
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut args = Vec::with_capacity(self.contents.len());

        for c in self.text.chars() {
            match c {
                MARKER => {
                    let Some(content) = self.contents.get(args.len()) else {
                        continue;
                    };
                    let index = args.len();
                    let alignment = content
                        .alignment
                        .map(|a| a.clamp(-MAX_ALIGNMENT, MAX_ALIGNMENT));
                    let fmt = content.format.as_deref().map(|f| {
                        f.chars()
                            .filter(|&ch| !matches!(ch, '{' | '}' | '\n'))
                            .collect::<String>()
                    });
                    format.push('{');
                    format.push_str(&index.to_string());
                    if let Some(alignment) = alignment {
                        format.push(',');
                        format.push_str(&alignment.to_string());
                    }
                    if let Some(fmt) = &fmt {
                        format.push(':');
                        format.push_str(fmt);
                    }
                    format.push('}');
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Placeholder(Placeholder {
                        index,
                        alignment,
                        format: fmt,
                    }));
                    args.push(content.object.clone());
                }
                '{' | '}' => {
                    format.push(c);
                    format.push(c);
                    literal.push(c);
                }
                _ => {
                    format.push(c);
                    literal.push(c);
                }
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        Template::from_parts(format, args, segments)
    }

    fn markers_before(&self, index: usize) -> usize {
        self.text[..index].matches(MARKER).count()
    }
}

fn strip_markers(text: &str) -> String {
    text.chars().filter(|&c| c != MARKER).collect()
}

impl From<&Template> for CompoundText {
    fn from(template: &Template) -> Self {
        let mut compound = CompoundText::new();
        for segment in template.segments() {
            match segment {
                Segment::Literal(text) => compound.push_text(text),
                Segment::Placeholder(p) => compound.push_content(Inline {
                    object: template.args()[p.index].clone(),
                    alignment: p.alignment,
                    format: p.format.clone(),
                }),
            }
        }
        compound
    }
}
