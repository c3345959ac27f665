use chrono::{NaiveDate, Utc};
use std::fmt;
use std::str::FromStr;

pub const BAGIT_TXT: &str = "BagIt-Version: 0.97\nTag-File-Character-Encoding: UTF-8\n";

/// Tag values must stay on one line
fn tag_line(key: &str, value: &str) -> String {
    let value: String = value
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect();
    format!("{}: {}\n", key, value.trim())
}

/// `bag-info.txt` tags
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BagInfo {
    pub source_organization: String,
    pub bagging_date: NaiveDate,
    pub bag_count: String,
    pub internal_sender_identifier: String,
    pub internal_sender_description: Option<String>,
    pub extra: Vec<(String, String)>,
}

impl BagInfo {
    pub fn new(source_organization: &str, internal_sender_identifier: &str) -> Self {
        Self {
            source_organization: source_organization.to_string(),
            bagging_date: Utc::now().date_naive(),
            bag_count: "1 of 1".to_string(),
            internal_sender_identifier: internal_sender_identifier.to_string(),
            internal_sender_description: None,
            extra: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.internal_sender_description = Some(description.to_string());
        self
    }

    pub fn with_tag(mut self, key: &str, value: &str) -> Self {
        self.extra.push((key.to_string(), value.to_string()));
        self
    }

    pub fn render(&self, payload_oxum: &str) -> String {
        let mut out = String::new();
        out.push_str(&tag_line("Source-Organization", &self.source_organization));
        out.push_str(&tag_line(
            "Bagging-Date",
            &self.bagging_date.format("%Y-%m-%d").to_string(),
        ));
        out.push_str(&tag_line("Bag-Count", &self.bag_count));
        out.push_str(&tag_line("Payload-Oxum", payload_oxum));
        out.push_str(&tag_line(
            "Internal-Sender-Identifier",
            &self.internal_sender_identifier,
        ));
        if let Some(description) = &self.internal_sender_description {
            out.push_str(&tag_line("Internal-Sender-Description", description));
        }
        for (key, value) in &self.extra {
            out.push_str(&tag_line(key, value));
        }
        out
    }
}

/// Who may see the preserved object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Access {
    #[default]
    Consortia,
    Restricted,
    Institution,
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Access::Consortia => "Consortia",
            Access::Restricted => "Restricted",
            Access::Institution => "Institution",
        };
        f.write_str(s)
    }
}

impl FromStr for Access {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "consortia" => Ok(Access::Consortia),
            "restricted" => Ok(Access::Restricted),
            "institution" => Ok(Access::Institution),
            other => Err(format!("Unknown access level: {other}")),
        }
    }
}

/// `aptrust-info.txt` tags
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AptrustInfo {
    pub title: String,
    pub access: Access,
}

impl AptrustInfo {
    pub fn new(title: &str, access: Access) -> Self {
        Self {
            title: title.to_string(),
            access,
        }
    }

    pub fn render(&self) -> String {
        format!(
            "{}{}",
            tag_line("Title", &self.title),
            tag_line("Access", &self.access.to_string())
        )
    }
}
