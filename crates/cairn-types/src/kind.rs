//! Entity kinds and the capability structs they compose.
//!
//! A kind is selected explicitly by the [`EntityKind`] variant. Capabilities
//! are shared by composition: a [`Document`] and a [`Site`] both embed a
//! [`Folder`], so anything that lists or titles folders works on them too.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Listing capability: a titled container whose children can be enumerated.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    pub title: String,
    pub description: Option<String>,
    /// Sort key among siblings; `None` sorts last.
    pub order: Option<i64>,
    /// Whether children are shown when this folder is rendered in menus.
    pub list_children: bool,
}

impl Folder {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            list_children: true,
            ..Default::default()
        }
    }
}

/// Navigation capability carried by documents.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Navigation {
    /// Title used in menus when it differs from the folder title.
    pub nav_title: Option<String>,
    pub in_navigation: bool,
    /// Target URL when the document only redirects.
    pub redirect: Option<String>,
    pub keywords: Vec<String>,
}

/// A renderable page.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub folder: Folder,
    pub navigation: Navigation,
    pub layout: Option<String>,
}

impl Document {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            folder: Folder::new(title),
            navigation: Navigation {
                in_navigation: true,
                ..Default::default()
            },
            layout: None,
        }
    }
}

/// Root of a site tree.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    pub folder: Folder,
    /// Host names this site answers to.
    pub hosts: Vec<String>,
    /// Name of the site this one inherits content from.
    pub parent_site: Option<String>,
}

impl Site {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            folder: Folder::new(title),
            ..Default::default()
        }
    }
}

/// The kind-specific payload of an entity.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityKind {
    #[default]
    Generic,
    Folder(Folder),
    Document(Document),
    Site(Site),
}

impl EntityKind {
    pub fn tag(&self) -> KindTag {
        match self {
            Self::Generic => KindTag::Generic,
            Self::Folder(_) => KindTag::Folder,
            Self::Document(_) => KindTag::Document,
            Self::Site(_) => KindTag::Site,
        }
    }

    /// The listing capability, if this kind has one.
    pub fn foldered(&self) -> Option<&Folder> {
        match self {
            Self::Generic => None,
            Self::Folder(f) => Some(f),
            Self::Document(d) => Some(&d.folder),
            Self::Site(s) => Some(&s.folder),
        }
    }

    pub fn foldered_mut(&mut self) -> Option<&mut Folder> {
        match self {
            Self::Generic => None,
            Self::Folder(f) => Some(f),
            Self::Document(d) => Some(&mut d.folder),
            Self::Site(s) => Some(&mut s.folder),
        }
    }

    /// The navigation capability, if this kind has one.
    pub fn navigable(&self) -> Option<&Navigation> {
        match self {
            Self::Document(d) => Some(&d.navigation),
            _ => None,
        }
    }

    pub fn title(&self) -> Option<&str> {
        self.foldered().map(|f| f.title.as_str())
    }
}

/// Payload-free discriminant of [`EntityKind`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KindTag {
    Generic,
    Folder,
    Document,
    Site,
}

impl KindTag {
    /// Whether an entity of `kind` satisfies a listing filter for this tag.
    ///
    /// `Generic` admits everything and `Folder` admits every kind carrying
    /// the folder capability.
    pub fn admits(&self, kind: &EntityKind) -> bool {
        match self {
            Self::Generic => true,
            Self::Folder => kind.foldered().is_some(),
            Self::Document => matches!(kind, EntityKind::Document(_)),
            Self::Site => matches!(kind, EntityKind::Site(_)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Generic => "generic",
            Self::Folder => "folder",
            Self::Document => "document",
            Self::Site => "site",
        }
    }
}

impl fmt::Display for KindTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KindTag {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "generic" | "entity" => Ok(Self::Generic),
            "folder" => Ok(Self::Folder),
            "document" => Ok(Self::Document),
            "site" => Ok(Self::Site),
            _ => Err(TypeError::UnknownKind(s.to_string())),
        }
    }
}
