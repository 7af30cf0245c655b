// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Upload page template

use minijinja::Environment;
use serde::Serialize;

use crate::Result;

pub const INDEX_NAME: &str = "index.html";

/// Banner shown above the form
#[derive(Debug, Serialize, Clone)]
pub struct Flash {
    /// one of `success`, `info`, `warning`, `error`
    pub kind: &'static str,
    pub text: String,
}

impl Flash {
    pub fn success(text: impl Into<String>) -> Self {
        Self { kind: "success", text: text.into() }
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self { kind: "warning", text: text.into() }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self { kind: "error", text: text.into() }
    }
}

/// Outcome of one upload
#[derive(Debug, Serialize, Default)]
pub struct ResultView {
    pub image_src: Option<String>,
    pub description: Option<String>,
    pub label: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Serialize, Default)]
pub struct PageView {
    pub workspace: Option<String>,
    pub available: Vec<String>,
    pub flashes: Vec<Flash>,
    pub result: Option<ResultView>,
}

/// Environment holding the page templates
pub fn environment() -> Result<Environment<'static>> {
    let mut env = Environment::new();
    env.add_template(INDEX_NAME, INDEX_TEMPLATE)?;
    Ok(env)
}

pub fn render(env: &Environment<'static>, view: &PageView) -> Result<String> {
    let template = env.get_template(INDEX_NAME)?;
    Ok(template.render(view)?)
}

const INDEX_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>trashlens - waste image classification</title>
    <style>
        :root {
            --bg-primary: #1a1a2e;
            --bg-card: #0f3460;
            --text-primary: #e8e8e8;
            --text-secondary: #a0a0a0;
            --accent: #e94560;
            --success: #00d9a5;
            --warning: #f0a500;
            --border: #2a2a4a;
        }
        * { box-sizing: border-box; margin: 0; padding: 0; }
        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            background: var(--bg-primary);
            color: var(--text-primary);
            line-height: 1.6;
        }
        .container { max-width: 900px; margin: 0 auto; padding: 20px; }
        h1 { color: var(--accent); margin-bottom: 5px; }
        .subtitle { color: var(--text-secondary); margin-bottom: 20px; }
        .card {
            background: var(--bg-card);
            border-radius: 12px;
            padding: 20px;
            margin-bottom: 20px;
        }
        .card h2 { margin-bottom: 15px; color: var(--accent); }
        .flash { padding: 10px 15px; border-radius: 6px; margin-bottom: 10px; border: 1px solid var(--border); }
        .flash.success { border-color: var(--success); color: var(--success); }
        .flash.info { border-color: var(--text-secondary); }
        .flash.warning { border-color: var(--warning); color: var(--warning); }
        .flash.error { border-color: var(--accent); color: var(--accent); }
        button { background: var(--accent); color: white; border: 0; border-radius: 6px; padding: 8px 16px; cursor: pointer; }
        select, input[type=file] { margin-right: 10px; }
        form { display: inline-block; margin: 5px 10px 5px 0; }
        .preview { max-width: 100%; border-radius: 8px; margin-bottom: 15px; }
        .label { font-size: 1.4em; font-weight: bold; color: var(--success); }
        .description { white-space: pre-wrap; }
    </style>
</head>
<body>
    <main class="container">
        <h1>Waste image classification</h1>
        <p class="subtitle">Upload a picture: the vision model describes it, the workspace knowledge base classifies it.</p>

        {% for flash in flashes %}
        <div class="flash {{ flash.kind }}">{{ flash.text }}</div>
        {% endfor %}

        <div class="card">
            <h2>Workspace</h2>
            <form method="post" action="/workspaces/load">
                <button type="submit">Load workspaces</button>
            </form>
            {% if available %}
            <form method="post" action="/workspace">
                <select name="workspace">
                    {% for ws in available %}
                    <option value="{{ ws }}"{% if ws == workspace %} selected{% endif %}>{{ ws }}</option>
                    {% endfor %}
                </select>
                <button type="submit">Switch workspace</button>
            </form>
            {% endif %}
            {% if workspace %}
            <div class="flash info">Current workspace: {{ workspace }}</div>
            {% else %}
            <div class="flash warning">Please select a workspace first</div>
            {% endif %}
        </div>

        <div class="card">
            <h2>Upload image</h2>
            <form method="post" action="/analyze" enctype="multipart/form-data">
                <input type="file" name="image" accept=".jpg,.jpeg,.png,image/jpeg,image/png" required>
                <button type="submit">Analyze</button>
            </form>
        </div>

        {% if result %}
        <div class="card">
            <h2>Result</h2>
            {% if result.image_src %}<img class="preview" src="{{ result.image_src }}" alt="uploaded image">{% endif %}
            {% if result.description %}
            <p><strong>📷 Description</strong></p>
            <p class="description">{{ result.description }}</p>
            {% endif %}
            {% if result.label %}
            <p><strong>🗑️ Classification</strong></p>
            <p class="label">{{ result.label }}</p>
            {% if result.category %}<p>Matched category: {{ result.category }}</p>{% endif %}
            {% endif %}
        </div>
        {% endif %}
    </main>
</body>
</html>"#;
