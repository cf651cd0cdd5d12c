// Built-in demo corpus and document file loading


use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::database::Document;

/// Question asked by the demo when none is given
pub const DEFAULT_QUESTION: &str = "متى تأسست شركة النور ومن هو رئيسها التنفيذي؟";

/// Four short documents about a fictitious company
pub const BUILTIN_DOCUMENTS: [&str; 4] = [
    "شركة النور حققت أرباحاً صافية بلغت 100 مليون دولار في الربع الأول من عام 2024. منتجها الأحدث هو 'النور برو', وهو حل برمجي لإدارة الطاقة.",
    "تأسست شركة النور في عام 2000، وتتخصص في تطوير حلول الطاقة المتجددة المبتكرة. مقرها الرئيسي في دبي.",
    "أرباح الربع الثاني لشركة النور في 2024 بلغت 120 مليون دولار، بزيادة قدرها 20% عن الربع السابق. يتميز 'النور برو' بواجهة مستخدم سهلة ودعم للذكاء الاصطناعي.",
    "الرئيس التنفيذي لشركة النور هو السيد أحمد السلمان، وقد أعلن عن خطط توسع عالمية في مؤتمر صحفي.",
];

#[inline]
pub fn builtin_documents() -> Vec<Document> {
    Document::sequential(BUILTIN_DOCUMENTS)
}

/// Load documents from a file.
///
/// `.json` files hold an array of strings; anything else is read as one
/// document per non-empty line.
#[inline]
pub fn load_documents(path: &Path) -> Result<Vec<Document>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read documents file: {}", path.display()))?;

    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let texts = if is_json {
        parse_json_documents(&content)
            .with_context(|| format!("Failed to parse documents file: {}", path.display()))?
    } else {
        parse_line_documents(&content)
    };

    if texts.is_empty() {
        anyhow::bail!("No documents found in {}", path.display());
    }

    Ok(Document::sequential(texts))
}

fn parse_json_documents(content: &str) -> Result<Vec<String>> {
    let texts: Vec<String> = serde_json::from_str(content)?;
    Ok(texts
        .into_iter()
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .collect())
}

fn parse_line_documents(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(ToString::to_string)
        .collect()
}
