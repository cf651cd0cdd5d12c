use itertools::Itertools;

/// Fixed answer the model is told to give when the context lacks the answer
pub const NOT_FOUND_PHRASE: &str = "المعلومة غير متوفرة في السياق.";

/// Instruction preceding the context block
pub const INSTRUCTION: &str = "أنت مساعد ذكي. أجب على السؤال بناءً على السياق فقط.\n\
إذا لم تتمكن من العثور على الإجابة في السياق المقدم، أجب بـ \"المعلومة غير متوفرة في السياق.\"";

const CONTEXT_LABEL: &str = "السياق:";
const QUESTION_LABEL: &str = "السؤال:";
const ANSWER_LABEL: &str = "الإجابة:";
const FENCE: &str = "---";

/// Join retrieved document texts into one context block, one document per line
#[inline]
pub fn build_context<I, S>(documents: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    documents
        .into_iter()
        .map(|doc| doc.as_ref().to_owned())
        .join("\n")
}

/// Compose the augmented prompt: instruction, fenced context, question, answer cue
#[inline]
pub fn build_prompt(context: &str, question: &str) -> String {
    format!(
        "{INSTRUCTION}\n{CONTEXT_LABEL}\n{FENCE}\n{context}\n{FENCE}\n{QUESTION_LABEL} {question}\n{ANSWER_LABEL}"
    )
}
