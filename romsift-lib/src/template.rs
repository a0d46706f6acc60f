//! Path templates such as `/roms/.nes/{name}.zip`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use romsift_core::{ConfigError, Machine};

/// Extension used for generated multi-disc playlists.
pub const PLAYLIST_EXTENSION: &str = "m3u";

static DISC_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\(Disc \d+[^)]*\)").expect("valid regex"));

/// A machine field that can appear in a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Name,
    Title,
    DiscTitle,
    Group,
    Parent,
    Romset,
    System,
    Emulator,
}

impl Field {
    fn from_placeholder(name: &str) -> Option<Self> {
        Some(match name {
            "name" => Self::Name,
            "title" => Self::Title,
            "disc_title" => Self::DiscTitle,
            "group" => Self::Group,
            "parent" => Self::Parent,
            "romset" => Self::Romset,
            "system" => Self::System,
            "emulator" => Self::Emulator,
            _ => return None,
        })
    }

    fn value<'m>(self, machine: &'m Machine) -> &'m str {
        match self {
            Self::Name => &machine.name,
            Self::Title => &machine.title,
            Self::DiscTitle => &machine.disc_title,
            Self::Group => &machine.group_name,
            Self::Parent => machine.parent_name.as_deref().unwrap_or(&machine.name),
            Self::Romset => &machine.romset,
            Self::System => &machine.system,
            Self::Emulator => machine.emulator.as_deref().unwrap_or(""),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Literal(String),
    Field(Field),
}

/// A parsed path template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    raw: String,
    parts: Vec<Part>,
}

impl FromStr for Template {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = Vec::new();
        let mut rest = s;
        while let Some(open) = rest.find('{') {
            if open > 0 {
                parts.push(Part::Literal(rest[..open].to_string()));
            }
            let close = rest[open..]
                .find('}')
                .ok_or_else(|| ConfigError::invalid_expression(s))?;
            let placeholder = &rest[open + 1..open + close];
            let field = Field::from_placeholder(placeholder).ok_or_else(|| {
                ConfigError::invalid_value(s, format!("unknown placeholder {{{placeholder}}}"))
            })?;
            parts.push(Part::Field(field));
            rest = &rest[open + close + 1..];
        }
        if rest.contains('}') {
            return Err(ConfigError::invalid_expression(s));
        }
        if !rest.is_empty() {
            parts.push(Part::Literal(rest.to_string()));
        }
        Ok(Self {
            raw: s.to_string(),
            parts,
        })
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Template {
    /// Render for a machine. Path separators inside field values are
    /// replaced so a value can never add directories.
    pub fn render(&self, machine: &Machine) -> String {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                Part::Literal(s) => out.push_str(s),
                Part::Field(field) => push_value(&mut out, field.value(machine)),
            }
        }
        out
    }

    pub fn render_path(&self, machine: &Machine) -> PathBuf {
        PathBuf::from(self.render(machine))
    }

    /// Regex matching any rendering of this template, anchored at both ends.
    pub fn pattern(&self) -> Regex {
        let mut source = String::from("^");
        for part in &self.parts {
            match part {
                Part::Literal(s) => source.push_str(&regex::escape(s)),
                Part::Field(_) => source.push_str("[^/]+"),
            }
        }
        source.push('$');
        Regex::new(&source).expect("escaped template pattern")
    }

    /// The same template with its extension replaced, e.g. for playlists.
    pub fn with_extension(&self, extension: &str) -> Self {
        let mut parts = self.parts.clone();
        match parts.last_mut() {
            Some(Part::Literal(s)) if s.contains('.') && !s.ends_with('/') => {
                if let Some(dot) = s.rfind('.') {
                    s.truncate(dot + 1);
                    s.push_str(extension);
                }
            }
            _ => parts.push(Part::Literal(format!(".{extension}"))),
        }
        Self::from_parts(parts)
    }

    /// The template with `{system}` and `{romset}` filled in, so it only
    /// matches files of that romset.
    pub fn bind(&self, system: &str, romset: &str) -> Self {
        let mut parts: Vec<Part> = Vec::new();
        for part in &self.parts {
            let literal = match part {
                Part::Literal(s) => s.clone(),
                Part::Field(Field::System) => path_safe(system),
                Part::Field(Field::Romset) => path_safe(romset),
                Part::Field(field) => {
                    parts.push(Part::Field(*field));
                    continue;
                }
            };
            match parts.last_mut() {
                Some(Part::Literal(previous)) => previous.push_str(&literal),
                _ => parts.push(Part::Literal(literal)),
            }
        }
        Self::from_parts(parts)
    }

    fn from_parts(parts: Vec<Part>) -> Self {
        let raw = parts
            .iter()
            .map(|p| match p {
                Part::Literal(s) => s.clone(),
                Part::Field(f) => format!("{{{}}}", field_name(*f)),
            })
            .collect();
        Self { raw, parts }
    }

    /// Directory part of the template that contains no placeholders.
    pub fn static_dir(&self) -> Option<PathBuf> {
        let Some(Part::Literal(prefix)) = self.parts.first() else {
            return None;
        };
        if self.parts.len() == 1 {
            return Path::new(prefix)
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf);
        }
        let dir = &prefix[..prefix.rfind('/')?];
        Some(if dir.is_empty() {
            PathBuf::from("/")
        } else {
            PathBuf::from(dir)
        })
    }
}

fn field_name(field: Field) -> &'static str {
    match field {
        Field::Name => "name",
        Field::Title => "title",
        Field::DiscTitle => "disc_title",
        Field::Group => "group",
        Field::Parent => "parent",
        Field::Romset => "romset",
        Field::System => "system",
        Field::Emulator => "emulator",
    }
}

fn push_value(out: &mut String, value: &str) {
    out.extend(value.chars().map(|c| match c {
        '/' | '\\' => '-',
        c => c,
    }));
}

fn path_safe(value: &str) -> String {
    let mut out = String::new();
    push_value(&mut out, value);
    out
}

/// Remove `(Disc N)` tags from a file name.
pub fn strip_disc_tag(name: &str) -> String {
    DISC_TAG.replace_all(name, "").into_owned()
}
