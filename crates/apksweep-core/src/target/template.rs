use anyhow::{Context, Result};

use super::CandidateId;

const PLACEHOLDER: &str = "%s";

/// Remote URL pattern with exactly one `%s` placeholder for the candidate id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlTemplate {
    template: String,
}

impl UrlTemplate {
    pub fn parse(template: &str) -> Result<Self> {
        let count = template.matches(PLACEHOLDER).count();
        if count != 1 {
            anyhow::bail!("URL template must contain exactly one {PLACEHOLDER}, found {count}: {template}");
        }
        // The expanded URL must parse; probe with a representative id.
        url::Url::parse(&template.replace(PLACEHOLDER, "0000"))
            .with_context(|| format!("invalid URL template: {template}"))?;
        Ok(Self {
            template: template.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    pub fn expand(&self, id: &CandidateId) -> String {
        self.template.replacen(PLACEHOLDER, &id.to_string(), 1)
    }

    /// `scheme://host[:port]` of the target, used for Referer and Origin.
    pub fn origin(&self) -> Option<String> {
        let parsed = url::Url::parse(&self.template.replace(PLACEHOLDER, "0000")).ok()?;
        match parsed.origin() {
            origin @ url::Origin::Tuple(..) => Some(origin.ascii_serialization()),
            url::Origin::Opaque(_) => None,
        }
    }
}

/// Local file naming: `<prefix><id><suffix>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileNaming {
    pub prefix: String,
    pub suffix: String,
}

impl Default for FileNaming {
    fn default() -> Self {
        Self {
            prefix: "app-".to_string(),
            suffix: ".apk".to_string(),
        }
    }
}

impl FileNaming {
    pub fn file_name(&self, id: &CandidateId) -> String {
        format!("{}{}{}", self.prefix, id, self.suffix)
    }

    /// True if `name` looks like one of our output files.
    pub fn matches(&self, name: &str) -> bool {
        name.len() > self.prefix.len() + self.suffix.len()
            && name.starts_with(&self.prefix)
            && name.ends_with(&self.suffix)
    }
}
