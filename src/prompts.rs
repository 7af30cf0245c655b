// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Prompt templates shared by every entry point

use minijinja::{context, Environment};
use serde::{Deserialize, Serialize};

use crate::Result;

/// Instruction sent with every image to the vision model
pub const VISION_PROMPT: &str = "You are a visual understanding model specialized in analyzing waste and trash items. \
Your task is not to classify the garbage, but to provide an **objective, highly detailed, \
and descriptive analysis** of the item's appearance, material, texture, color, shape, structure, \
and cleanliness. Write in English and use complete sentences. Be verbose, descriptive, and comprehensive. \
Include details about: \
1. Item type and general shape, size, and color. \
2. Material composition (single material or composite, presence of coatings, metal, glass, plastic, paper, etc.). \
3. Surface condition and cleanliness (clean, slightly dirty, oily, stained, etc.). \
4. Any distinguishing features, logos, texts, patterns, or labels visible. \
5. Transparency, reflectivity, or texture details. \
6. Avoid any guesses about the item's purpose or category, focus only on visible attributes. \
Make the description as long and detailed as possible without speculating.";

/// Classification instruction; receives `description` and `categories`
pub const CLASSIFICATION_TEMPLATE: &str = "你是一個垃圾分類推理模型，負責根據「垃圾圖片的文字描述」，並依照「知識庫中的垃圾分類規則」進行分類推理
【垃圾描述】
{{ description }}
【分類原則】
1. 分類時必須以知識庫中的分類規則為最高優先依據
2. 若知識庫中未明確定義該物品，請基於垃圾材質、結構與使用狀態進行合理推理
3. 若物品為複合材質，請判斷是否需要拆解後再分類，並於說明中清楚指出
4. 若垃圾含有殘渣、油污或液體，請將清潔度納入分類考量
5. 請避免臆測影像中無法判斷的資訊
請直接回答分類名稱：{{ categories | join(\"、\") }}或是知識庫類明確定義分類。";

/// Guidance categories offered to the classifier.
///
/// The classifier may answer with anything; these only help recognise common answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Recyclable,
    General,
    FoodWaste,
    ResourceRecycling,
    Special,
    NeedsDisassembly,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Recyclable,
        Category::General,
        Category::FoodWaste,
        Category::ResourceRecycling,
        Category::Special,
        Category::NeedsDisassembly,
    ];

    /// Label as it appears in the prompt
    pub fn label(self) -> &'static str {
        match self {
            Category::Recyclable => "可回收物",
            Category::General => "一般垃圾",
            Category::FoodWaste => "廚餘",
            Category::ResourceRecycling => "資源回收",
            Category::Special => "其他特殊廢棄物",
            Category::NeedsDisassembly => "需拆解",
        }
    }

    /// First guidance category mentioned in a free-text answer.
    ///
    /// Mentions directly preceded by a negation (`不可回收物`) do not count.
    pub fn detect(answer: &str) -> Option<Category> {
        Self::ALL
            .iter()
            .filter_map(|c| {
                answer
                    .match_indices(c.label())
                    .map(|(pos, _)| pos)
                    .find(|&pos| !is_negated(&answer[..pos]))
                    .map(|pos| (pos, *c))
            })
            .min_by_key(|(pos, _)| *pos)
            .map(|(_, c)| c)
    }
}

const NEGATIONS: [char; 3] = ['不', '非', '無'];

fn is_negated(before: &str) -> bool {
    before.chars().next_back().is_some_and(|c| NEGATIONS.contains(&c))
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Render the classification instruction for one description
pub fn render_classification(template: &str, description: &str) -> Result<String> {
    let env = Environment::new();
    let categories: Vec<&str> = Category::ALL.iter().map(|c| c.label()).collect();
    let rendered = env.render_str(
        template,
        context! { description => description.trim(), categories => categories },
    )?;
    Ok(rendered.trim().to_string())
}
