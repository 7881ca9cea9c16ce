//! The flat HTTP object registry: built-in paths, their type, and verb
//! restrictions (§4.5).

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct VerbMask: u8 {
        const GET = 0b001;
        const HEAD = 0b010;
        const POST = 0b100;
    }
}

#[derive(Debug, Clone)]
pub enum EntryKind {
    Dir,
    FixedText(String),
    FixedBinary(Vec<u8>),
    DynTerm,
    DynNonterm,
}

#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub path: String,
    pub kind: EntryKind,
    pub content_type: &'static str,
    pub verbs: VerbMask,
    pub description: String,
    pub hidden: bool,
}

/// What a lookup against the registry produced.
pub enum ResolvedRoute<'a> {
    Entry { entry: &'a RegistryEntry, remainder: Option<String> },
    DirRedirect(String),
}

pub struct Registry {
    entries: Vec<RegistryEntry>,
}

impl Default for Registry {
    fn default() -> Self {
        Registry::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        let get_head = VerbMask::GET | VerbMask::HEAD;
        let entries = vec![
            RegistryEntry {
                path: "/3270".to_string(),
                kind: EntryKind::Dir,
                content_type: "text/html",
                verbs: get_head,
                description: "x3270 control surface".to_string(),
                hidden: false,
            },
            RegistryEntry {
                path: "/3270/screen.html".to_string(),
                kind: EntryKind::DynTerm,
                content_type: "text/html",
                verbs: get_head,
                description: "current screen rendered as HTML".to_string(),
                hidden: false,
            },
            RegistryEntry {
                path: "/3270/interact.html".to_string(),
                kind: EntryKind::DynTerm,
                content_type: "text/html",
                verbs: get_head,
                description: "interactive action form".to_string(),
                hidden: false,
            },
            RegistryEntry {
                path: "/3270/rest".to_string(),
                kind: EntryKind::Dir,
                content_type: "text/html",
                verbs: get_head,
                description: "REST action adapters".to_string(),
                hidden: false,
            },
            RegistryEntry {
                path: "/3270/rest/text".to_string(),
                kind: EntryKind::DynNonterm,
                content_type: "text/plain",
                verbs: get_head,
                description: "action result as plain text lines".to_string(),
                hidden: false,
            },
            RegistryEntry {
                path: "/3270/rest/stext".to_string(),
                kind: EntryKind::DynNonterm,
                content_type: "text/plain",
                verbs: get_head,
                description: "action result with status line prefix".to_string(),
                hidden: false,
            },
            RegistryEntry {
                path: "/3270/rest/html".to_string(),
                kind: EntryKind::DynNonterm,
                content_type: "text/html",
                verbs: get_head,
                description: "action result as an HTML fragment".to_string(),
                hidden: false,
            },
            RegistryEntry {
                path: "/3270/rest/json".to_string(),
                kind: EntryKind::DynNonterm,
                content_type: "application/json",
                verbs: get_head,
                description: "action result as a JSON envelope".to_string(),
                hidden: false,
            },
            RegistryEntry {
                path: "/3270/rest/post".to_string(),
                kind: EntryKind::DynTerm,
                content_type: "text/plain",
                verbs: VerbMask::POST,
                description: "action via POST body".to_string(),
                hidden: false,
            },
            RegistryEntry {
                path: "/favicon.ico".to_string(),
                kind: EntryKind::FixedBinary(Vec::new()),
                content_type: "image/vnd.microsoft.icon",
                verbs: get_head,
                description: "favicon".to_string(),
                hidden: true,
            },
        ];
        Registry { entries }
    }

    pub fn resolve(&self, path: &str) -> Option<ResolvedRoute<'_>> {
        for entry in &self.entries {
            if path == entry.path {
                if matches!(entry.kind, EntryKind::Dir) {
                    return Some(ResolvedRoute::DirRedirect(format!("{path}/")));
                }
                return Some(ResolvedRoute::Entry { entry, remainder: None });
            }
            if matches!(entry.kind, EntryKind::Dir) {
                if let Some(rest) = path.strip_prefix(&format!("{}/", entry.path)) {
                    if rest.is_empty() {
                        return Some(ResolvedRoute::Entry { entry, remainder: None });
                    }
                    continue;
                }
            }
            if matches!(entry.kind, EntryKind::DynNonterm) {
                let prefix = format!("{}/", entry.path);
                if let Some(remainder) = path.strip_prefix(&prefix) {
                    return Some(ResolvedRoute::Entry { entry, remainder: Some(remainder.to_string()) });
                }
            }
        }
        None
    }

    /// Direct, non-hidden children of `dir_path` (immediate path segment only).
    pub fn children_of(&self, dir_path: &str) -> Vec<&RegistryEntry> {
        let prefix = format!("{dir_path}/");
        self.entries
            .iter()
            .filter(|e| !e.hidden && e.path.starts_with(&prefix) && !e.path[prefix.len()..].contains('/'))
            .collect()
    }

    pub fn render_dir_listing(&self, dir_path: &str) -> String {
        let mut body = format!("<html><head><title>{dir_path}</title></head><body><h1>{dir_path}</h1><ul>");
        for child in self.children_of(dir_path) {
            let name = child.path.rsplit('/').next().unwrap_or(&child.path);
            let suffix = if matches!(child.kind, EntryKind::Dir) { "/" } else { "" };
            body.push_str(&format!("<li><a href=\"{}{}\">{}{}</a> — {}</li>", child.path, suffix, name, suffix, child.description));
        }
        body.push_str("</ul></body></html>");
        body
    }
}
