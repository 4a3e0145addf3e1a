//! HTTP 内容协商
//!
//! 解析 `Accept` 请求头，并在服务端可提供的媒体类型中选出最佳匹配。
//!
//! 匹配规则：
//!
//! - 每个候选类型取**最具体**的匹配范围（`text/json` > `text/*` > `*/*`）的 q 值
//! - q 值为 0 的候选被拒绝
//! - q 值最高者胜出；q 值相同时匹配更具体者胜出；仍相同时按候选顺序取第一个
//! - 没有 `Accept` 头（或头为空）时接受任何类型，返回第一个候选

use std::cmp::Ordering;

/// 提取媒体类型的本体部分：去掉参数、空白，并转为小写
///
/// ```
/// use manticore_core::negotiation::essence;
///
/// assert_eq!(essence("Text/JSON; charset=UTF-8"), "text/json");
/// ```
pub fn essence(media_type: &str) -> String {
    media_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// `Accept` 头中的一个媒体范围
#[derive(Debug, Clone, PartialEq)]
pub struct MediaRange {
    main_type: String,
    sub_type: String,
    quality: f32,
}

impl MediaRange {
    fn parse(item: &str) -> Option<Self> {
        let mut parts = item.split(';');
        let mime = essence(parts.next()?);
        let (main_type, sub_type) = mime.split_once('/')?;
        if main_type.is_empty() || sub_type.is_empty() {
            return None;
        }

        let mut quality = 1.0;
        for param in parts {
            if let Some((key, value)) = param.split_once('=') {
                if key.trim().eq_ignore_ascii_case("q") {
                    quality = value.trim().parse::<f32>().ok()?.clamp(0.0, 1.0);
                }
            }
        }

        Some(Self {
            main_type: main_type.to_string(),
            sub_type: sub_type.to_string(),
            quality,
        })
    }

    /// 具体程度：2 = 完整类型，1 = `type/*`，0 = `*/*`
    fn specificity(&self) -> u8 {
        match (self.main_type.as_str(), self.sub_type.as_str()) {
            ("*", _) => 0,
            (_, "*") => 1,
            _ => 2,
        }
    }

    fn matches(&self, offer: &str) -> bool {
        let Some((main_type, sub_type)) = offer.split_once('/') else {
            return false;
        };
        (self.main_type == "*" || self.main_type == main_type)
            && (self.sub_type == "*" || self.sub_type == sub_type)
    }

    pub fn quality(&self) -> f32 {
        self.quality
    }
}

/// 解析后的 `Accept` 头
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Accept {
    /// `None` 表示客户端没有声明偏好
    ranges: Option<Vec<MediaRange>>,
}

impl Accept {
    /// 解析 `Accept` 头，无法识别的条目被忽略
    pub fn parse(header: Option<&str>) -> Self {
        let ranges = header
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| value.split(',').filter_map(MediaRange::parse).collect());
        Self { ranges }
    }

    /// 接受任意类型
    pub fn any() -> Self {
        Self { ranges: None }
    }

    pub fn ranges(&self) -> &[MediaRange] {
        self.ranges.as_deref().unwrap_or_default()
    }

    /// 候选类型的 (q 值, 具体程度)，没有任何范围匹配时返回 `None`
    fn preference(&self, offer: &str) -> Option<(f32, u8)> {
        let Some(ranges) = &self.ranges else {
            return Some((1.0, 0));
        };

        ranges
            .iter()
            .filter(|range| range.matches(offer))
            .max_by_key(|range| range.specificity())
            .map(|range| (range.quality, range.specificity()))
    }

    /// 在候选类型中选出最佳匹配
    pub fn best_match<'a, I>(&self, offers: I) -> Option<&'a str>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut best: Option<(&'a str, f32, u8)> = None;

        for offer in offers {
            let Some((quality, specificity)) = self.preference(&essence(offer)) else {
                continue;
            };
            if quality <= 0.0 {
                continue;
            }

            let better = match best {
                None => true,
                Some((_, best_quality, best_specificity)) => {
                    match quality.partial_cmp(&best_quality) {
                        Some(Ordering::Greater) => true,
                        Some(Ordering::Equal) => specificity > best_specificity,
                        _ => false,
                    }
                }
            };

            if better {
                best = Some((offer, quality, specificity));
            }
        }

        best.map(|(offer, _, _)| offer)
    }
}
