use std::collections::HashMap;

use url::form_urlencoded;

use crate::SessionError;

/// Version tag used when the page URL does not ask for one.
pub const DEFAULT_VERSION_TAG: &str = "master";

/// Server mount holding the example sources.
pub const EXAMPLE_SOURCE_ROOT: &str = "/examples/src";

/// How the page URL names its example.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityEncoding {
    /// `d=<dir>&f=<file>[&t=<title>]`
    Legacy(LegacyIdentity),
    /// `path=<dir>/<name>`
    Combined(CombinedIdentity),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyIdentity {
    pub dir: String,
    pub file: String,
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombinedIdentity {
    pub dir: String,
    pub name: String,
}

impl IdentityEncoding {
    /// Pick the encoding present in `params`; `path` wins over `d`/`f`.
    ///
    /// # Errors
    ///
    /// Returns an error when neither encoding is present or `path` has no
    /// `dir/name` split.
    pub fn from_params(params: &QueryParams) -> Result<Self, SessionError> {
        if let Some(path) = params.get("path") {
            let (dir, name) = path
                .split_once('/')
                .filter(|(dir, name)| !dir.is_empty() && !name.is_empty())
                .ok_or_else(|| SessionError::InvalidPath(path.to_string()))?;
            return Ok(Self::Combined(CombinedIdentity {
                dir: dir.to_string(),
                name: name.to_string(),
            }));
        }
        if params.get("d").is_some() || params.get("f").is_some() {
            return Ok(Self::Legacy(LegacyIdentity {
                dir: params.get("d").unwrap_or_default().to_string(),
                file: params.get("f").unwrap_or_default().to_string(),
                title: params.get("t").map(str::to_string),
            }));
        }
        Err(SessionError::MissingExample)
    }
}

/// Which example a viewer page shows, and with which library version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExampleIdentity {
    pub dir: String,
    pub name: String,
    pub file: String,
    pub title: String,
    pub jsbin: Option<String>,
    pub version: String,
}

impl ExampleIdentity {
    /// Parse a full page URL (or a bare query string).
    ///
    /// # Errors
    ///
    /// See [`IdentityEncoding::from_params`].
    pub fn from_url(url: &str, default_version: &str) -> Result<Self, SessionError> {
        Self::from_params(&QueryParams::from_url(url), default_version)
    }

    /// # Errors
    ///
    /// See [`IdentityEncoding::from_params`].
    pub fn from_params(params: &QueryParams, default_version: &str) -> Result<Self, SessionError> {
        let (dir, name, title) = match IdentityEncoding::from_params(params)? {
            IdentityEncoding::Combined(CombinedIdentity { dir, name }) => {
                let title = name.clone();
                (dir, name, title)
            }
            IdentityEncoding::Legacy(LegacyIdentity { dir, file, title }) => {
                let name = strip_js_suffix(&file).to_string();
                let title = title.unwrap_or_else(|| name.clone());
                (dir, name, title)
            }
        };
        let file = if name.is_empty() {
            String::new()
        } else {
            format!("{name}.js")
        };
        let version = params
            .get("v")
            .or_else(|| params.get("phaser_version"))
            .unwrap_or(default_version)
            .to_string();
        let jsbin = params.get("jsbin").map(expand_jsbin);

        Ok(Self {
            dir,
            name,
            file,
            title,
            jsbin,
            version,
        })
    }

    /// Client storage key for edits of this example.
    #[must_use]
    pub fn storage_key(&self) -> String {
        format!("[{}/{}]", self.dir, self.file)
    }

    /// Server path of the pristine example source.
    #[must_use]
    pub fn source_path(&self) -> String {
        format!("{EXAMPLE_SOURCE_ROOT}/{}/{}", self.dir, self.file)
    }

    #[must_use]
    pub fn document_title(&self) -> String {
        format!("phaser - {}", self.title)
    }
}

fn strip_js_suffix(file: &str) -> &str {
    let len = file.len();
    if len >= 3 && file.is_char_boundary(len - 3) && file[len - 3..].eq_ignore_ascii_case(".js") {
        &file[..len - 3]
    } else {
        file
    }
}

fn expand_jsbin(raw: &str) -> String {
    let lowered = raw.to_ascii_lowercase();
    if lowered.starts_with("http:") || lowered.starts_with("https:") {
        raw.to_string()
    } else {
        format!("http://jsbin.com/{raw}/edit?js,output")
    }
}

/// Decoded query parameters; empty values count as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pairs: Vec<(String, String)>,
    first: HashMap<String, usize>,
}

impl QueryParams {
    #[must_use]
    pub fn parse(query: &str) -> Self {
        let mut params = Self::default();
        for (key, value) in form_urlencoded::parse(query.trim_start_matches('?').as_bytes()) {
            let index = params.pairs.len();
            params.first.entry(key.to_string()).or_insert(index);
            params.pairs.push((key.into_owned(), value.into_owned()));
        }
        params
    }

    /// Parameters of a full URL; anything before `?` and after `#` is ignored.
    #[must_use]
    pub fn from_url(url: &str) -> Self {
        let without_fragment = url.split_once('#').map_or(url, |(head, _)| head);
        let query = without_fragment
            .split_once('?')
            .map_or(without_fragment, |(_, query)| query);
        Self::parse(query)
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.first
            .get(key)
            .map(|&index| self.pairs[index].1.as_str())
            .filter(|value| !value.is_empty())
    }

    #[must_use]
    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }
}
