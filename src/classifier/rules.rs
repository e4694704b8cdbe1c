// Copyright 2026 The Toolmux Project
// SPDX-License-Identifier: Apache-2.0

// Keyword rule table
//
// Fallback intent detection used when LLM extraction is disabled or fails.
// Rules are checked in table order and the first keyword hit wins.

use serde_json::json;

use super::Intent;
use crate::tool::Arguments;

#[derive(Debug, Clone, Copy)]
enum RuleTool {
    Weather,
    Echo,
    Search,
}

const RULES: &[(RuleTool, &[&str])] = &[
    (
        RuleTool::Weather,
        &["天气", "气温", "下雨", "温度", "humidity", "气候", "weather"],
    ),
    (RuleTool::Echo, &["回声", "复述", "echo", "repeat"]),
    (RuleTool::Search, &["搜索", "查询", "查找", "search"]),
];

const CITIES: &[&str] = &[
    "北京", "上海", "广州", "深圳", "杭州", "成都", "重庆", "武汉", "西安", "南京",
    "beijing", "shanghai", "guangzhou", "shenzhen",
];

const DEFAULT_CITY: &str = "北京";

/// Characters that mark a city name as Chinese.
const CN_CITY_CHARS: &str = "京沪广深杭成重武西南";

/// Only the Chinese search keywords are stripped from the query.
const SEARCH_STRIP: &[&str] = &["搜索", "查询", "查找"];

/// Detect a tool intent from `text` using the keyword table.
pub fn detect(text: &str) -> Option<Intent> {
    let lowered = text.to_lowercase();

    let (tool, _) = RULES
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lowered.contains(k)))?;

    let (name, parameters) = match tool {
        RuleTool::Weather => {
            let city = CITIES
                .iter()
                .find(|c| lowered.contains(*c))
                .copied()
                .unwrap_or(DEFAULT_CITY);
            let country = if city.chars().any(|c| CN_CITY_CHARS.contains(c)) {
                "CN"
            } else {
                "US"
            };
            ("weather", json!({"city": city, "country": country}))
        }
        RuleTool::Echo => ("echo", json!({"message": text})),
        RuleTool::Search => {
            let query = SEARCH_STRIP
                .iter()
                .fold(text.to_string(), |acc, k| acc.replace(k, ""));
            ("search", json!({"query": query.trim()}))
        }
    };

    let parameters: Arguments = match parameters {
        serde_json::Value::Object(map) => map,
        _ => Arguments::new(),
    };

    Some(Intent {
        tool: name.to_string(),
        parameters,
    })
}
