// Passive detection of secrets and personal data in fetched bodies

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::debug;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FindingKind {
    ChineseIdNumber,
    ChineseMobile,
    Email,
    AwsAccessKey,
    AliyunAccessKey,
    TencentSecretId,
    GoogleApiKey,
    GithubToken,
    SlackToken,
    StripeSecretKey,
    JsonWebToken,
    PrivateKey,
    PasswordAssignment,
    BearerToken,
}

impl FindingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FindingKind::ChineseIdNumber => "id_number",
            FindingKind::ChineseMobile => "mobile",
            FindingKind::Email => "email",
            FindingKind::AwsAccessKey => "aws_access_key",
            FindingKind::AliyunAccessKey => "aliyun_access_key",
            FindingKind::TencentSecretId => "tencent_secret_id",
            FindingKind::GoogleApiKey => "google_api_key",
            FindingKind::GithubToken => "github_token",
            FindingKind::SlackToken => "slack_token",
            FindingKind::StripeSecretKey => "stripe_secret_key",
            FindingKind::JsonWebToken => "jwt",
            FindingKind::PrivateKey => "private_key",
            FindingKind::PasswordAssignment => "password",
            FindingKind::BearerToken => "bearer_token",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensitiveFinding {
    pub kind: FindingKind,
    pub severity: Severity,
    pub value: String,
    pub offset: usize,
}

struct Rule {
    kind: FindingKind,
    severity: Severity,
    pattern: Regex,
    // Capture group holding the reported value; 0 is the whole match.
    group: usize,
}

fn rule(kind: FindingKind, severity: Severity, pattern: &str, group: usize) -> Rule {
    Rule {
        kind,
        severity,
        pattern: Regex::new(pattern).expect("static sensitive pattern"),
        group,
    }
}

static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        rule(
            FindingKind::PrivateKey,
            Severity::Critical,
            r"-----BEGIN (?:RSA |EC |DSA |OPENSSH |PGP )?PRIVATE KEY(?: BLOCK)?-----",
            0,
        ),
        rule(
            FindingKind::AwsAccessKey,
            Severity::Critical,
            r"\b(?:A3T[A-Z0-9]|AKIA|ASIA|ABIA|ACCA)[A-Z0-9]{16}\b",
            0,
        ),
        rule(FindingKind::AliyunAccessKey, Severity::Critical, r"\bLTAI[A-Za-z0-9]{12,20}\b", 0),
        rule(FindingKind::TencentSecretId, Severity::Critical, r"\bAKID[A-Za-z0-9]{13,40}\b", 0),
        rule(FindingKind::GoogleApiKey, Severity::High, r"\bAIza[0-9A-Za-z\-_]{35}", 0),
        rule(
            FindingKind::GithubToken,
            Severity::Critical,
            r"\b(?:gh[oprsu]_[A-Za-z0-9_]{36,}|github_pat_[A-Za-z0-9_]{22,})",
            0,
        ),
        rule(FindingKind::SlackToken, Severity::High, r"\bxox[baprs]-[A-Za-z0-9-]{10,}", 0),
        rule(
            FindingKind::StripeSecretKey,
            Severity::Critical,
            r"\b[sr]k_(?:live|test)_[A-Za-z0-9]{20,}",
            0,
        ),
        rule(
            FindingKind::JsonWebToken,
            Severity::High,
            r"\beyJ[A-Za-z0-9_-]{8,}\.eyJ[A-Za-z0-9_-]{8,}\.[A-Za-z0-9_-]{8,}",
            0,
        ),
        rule(
            FindingKind::BearerToken,
            Severity::High,
            r"(?i)\bbearer\s+([A-Za-z0-9\-._~+/]{20,}=*)",
            1,
        ),
        rule(
            FindingKind::PasswordAssignment,
            Severity::High,
            r#"(?i)["']?(?:password|passwd|pwd|secret_?key|client_?secret)["']?\s*[:=]\s*["']([^"'\s]{4,})["']"#,
            1,
        ),
        rule(
            FindingKind::ChineseIdNumber,
            Severity::Medium,
            r"\b[1-9]\d{5}(?:18|19|20)\d{2}(?:0[1-9]|1[0-2])(?:0[1-9]|[12]\d|3[01])\d{3}[\dXx]\b",
            0,
        ),
        rule(FindingKind::ChineseMobile, Severity::Low, r"\b1[3-9]\d{9}\b", 0),
        rule(
            FindingKind::Email,
            Severity::Low,
            r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b",
            0,
        ),
    ]
});

/// Runs the fixed battery of secret/PII patterns over response text.
#[derive(Debug, Clone, Copy, Default)]
pub struct SensitiveDetector;

impl SensitiveDetector {
    pub fn scan(body: &str) -> Vec<SensitiveFinding> {
        let mut seen: HashSet<(FindingKind, String)> = HashSet::new();
        let mut findings = Vec::new();

        for rule in RULES.iter() {
            for caps in rule.pattern.captures_iter(body) {
                let Some(m) = caps.get(rule.group) else {
                    continue;
                };
                let value = m.as_str().to_string();
                if seen.insert((rule.kind, value.clone())) {
                    findings.push(SensitiveFinding {
                        kind: rule.kind,
                        severity: rule.severity,
                        value,
                        offset: m.start(),
                    });
                }
            }
        }

        findings.sort_by_key(|f| f.offset);
        if !findings.is_empty() {
            debug!("Sensitive scan produced {} finding(s)", findings.len());
        }
        findings
    }
}

pub const DEFAULT_DANGER_PATTERNS: &[&str] = &[
    "delete", "remove", "drop", "logout", "signout", "shutdown", "reset", "destroy", "purge",
];

/// Flags links that look like destructive endpoints.
#[derive(Debug, Clone)]
pub struct DangerFilter {
    patterns: Vec<String>,
    enabled: bool,
}

impl Default for DangerFilter {
    fn default() -> Self {
        Self::new(Vec::new(), false)
    }
}

impl DangerFilter {
    /// An empty pattern list falls back to [`DEFAULT_DANGER_PATTERNS`].
    pub fn new(patterns: Vec<String>, enabled: bool) -> Self {
        let patterns: Vec<String> = if patterns.is_empty() {
            DEFAULT_DANGER_PATTERNS.iter().map(|p| p.to_string()).collect()
        } else {
            patterns
                .into_iter()
                .map(|p| p.trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect()
        };
        Self { patterns, enabled }
    }

    /// Whether dangerous links are kept out of the frontier.
    pub fn suppresses(&self) -> bool {
        self.enabled
    }

    /// Matches against path and query only, so a host name never trips it.
    pub fn is_dangerous(&self, url: &str) -> bool {
        let target = match Url::parse(url) {
            Ok(parsed) => {
                let mut t = parsed.path().to_lowercase();
                if let Some(q) = parsed.query() {
                    t.push('?');
                    t.push_str(&q.to_lowercase());
                }
                t
            }
            Err(_) => url.to_lowercase(),
        };
        self.patterns.iter().any(|p| target.contains(p.as_str()))
    }
}
