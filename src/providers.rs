//! 大型服务商的字典与数据源扩展
//!
//! 扩展数据按域名后缀匹配，与发现逻辑本身解耦：
//! 暴破器从这里取额外标签，证书日志聚合器从这里取额外的查询子区域。

use std::collections::HashSet;

use crate::model::WordlistEntry;

/// 带编号的标签，例如 `cdn1` 到 `cdn8`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumberedLabel {
    pub stem: &'static str,
    pub from: u16,
    pub to: u16,
}

impl NumberedLabel {
    pub fn expand(&self) -> impl Iterator<Item = String> + '_ {
        (self.from..=self.to).map(move |n| format!("{}{}", self.stem, n))
    }
}

/// 单个服务商的扩展数据
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderProfile {
    pub name: &'static str,
    /// 命中任一后缀即启用
    pub suffixes: &'static [&'static str],
    pub labels: &'static [&'static str],
    pub numbered: &'static [NumberedLabel],
    /// 需要单独查询证书日志的子区域（相对目标域名）
    pub ct_zones: &'static [&'static str],
}

impl ProviderProfile {
    pub fn matches(&self, domain: &str) -> bool {
        self.suffixes.iter().any(|suffix| {
            domain == *suffix
                || (domain.ends_with(suffix)
                    && domain.as_bytes()[domain.len() - suffix.len() - 1] == b'.')
        })
    }

    /// 展开本服务商的全部标签
    pub fn expand_labels(&self) -> Vec<String> {
        self.labels
            .iter()
            .map(|label| label.to_string())
            .chain(self.numbered.iter().flat_map(|n| n.expand()))
            .collect()
    }
}

const FACEBOOK: ProviderProfile = ProviderProfile {
    name: "facebook",
    suffixes: &["facebook.com", "fb.com", "fbcdn.net"],
    labels: &[
        "scontent", "static", "external", "graph", "upload", "video", "lookaside",
        "edge-chat", "star", "business", "developers", "l", "m", "mbasic", "touch",
    ],
    numbered: &[NumberedLabel { stem: "edge-star-shv-0", from: 1, to: 9 }],
    ct_zones: &["m", "developers", "business"],
};

const GOOGLE: ProviderProfile = ProviderProfile {
    name: "google",
    suffixes: &["google.com", "googleapis.com", "gstatic.com"],
    labels: &[
        "accounts", "mail", "drive", "docs", "maps", "play", "apis", "news", "photos",
        "calendar", "translate", "support", "developers", "cloud", "console",
    ],
    numbered: &[
        NumberedLabel { stem: "clients", from: 1, to: 6 },
        NumberedLabel { stem: "lh", from: 3, to: 6 },
    ],
    ct_zones: &["corp", "sandbox"],
};

const YANDEX: ProviderProfile = ProviderProfile {
    name: "yandex",
    suffixes: &["yandex.ru", "yandex.net", "ya.ru"],
    labels: &[
        "mail", "disk", "music", "market", "maps", "passport", "translate", "zen",
        "cloud", "api", "mc", "an", "yastatic", "avatars", "oauth",
    ],
    numbered: &[NumberedLabel { stem: "mc", from: 1, to: 4 }],
    ct_zones: &["cloud", "market"],
};

const VK: ProviderProfile = ProviderProfile {
    name: "vk",
    suffixes: &["vk.com", "vk.me", "userapi.com"],
    labels: &["m", "api", "oauth", "login", "dev", "pp", "static", "st", "queuev4", "im"],
    numbered: &[
        NumberedLabel { stem: "sun", from: 1, to: 9 },
        NumberedLabel { stem: "psv", from: 1, to: 4 },
        NumberedLabel { stem: "cs", from: 1, to: 20 },
    ],
    ct_zones: &["dev", "api"],
};

/// 服务商扩展的注册表
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderRegistry {
    profiles: Vec<ProviderProfile>,
}

impl ProviderRegistry {
    pub fn builtin() -> Self {
        ProviderRegistry {
            profiles: vec![FACEBOOK, GOOGLE, YANDEX, VK],
        }
    }

    pub fn empty() -> Self {
        ProviderRegistry { profiles: Vec::new() }
    }

    pub fn with_profile(mut self, profile: ProviderProfile) -> Self {
        self.profiles.push(profile);
        self
    }

    pub fn matching<'a>(&'a self, domain: &'a str) -> impl Iterator<Item = &'a ProviderProfile> + 'a {
        self.profiles.iter().filter(move |p| p.matches(domain))
    }

    /// 把匹配服务商的标签追加到字典末尾，不引入重复
    pub fn augment_labels(&self, domain: &str, labels: &mut Vec<WordlistEntry>) -> usize {
        let mut seen: HashSet<String> = labels.iter().map(|e| e.label().to_string()).collect();
        let before = labels.len();
        for profile in self.matching(domain) {
            for label in profile.expand_labels() {
                let entry = WordlistEntry::new(&label);
                if seen.insert(entry.label().to_string()) {
                    labels.push(entry);
                }
            }
        }
        labels.len() - before
    }

    /// 匹配服务商需要单独查询的完整子区域
    pub fn ct_zones(&self, domain: &str) -> Vec<String> {
        let mut zones: Vec<String> = self
            .matching(domain)
            .flat_map(|p| p.ct_zones.iter().map(move |zone| format!("{}.{}", zone, domain)))
            .collect();
        zones.dedup();
        zones
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
