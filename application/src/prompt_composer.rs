use domain::session::Message;

/// Default system instruction for the compliance assistant.
pub const SECURITY_CONTEXT: &str = "
You are an AWS Security & Compliance expert.
Explain cybersecurity and compliance frameworks (FISMA, NIST 800-53, CIS, FedRAMP)
and how to implement them using AWS services such as IAM, Config, GuardDuty,
SecurityHub, CloudTrail, and CloudWatch.
Be concise and provide AWS service mapping examples when possible.
";

/// Assemble the model input: system context, retrieved context, prior
/// turns, then the question. Nothing is truncated. A blank system context
/// is omitted entirely.
pub fn compose(
    system_context: &str,
    retrieved_chunks: &[String],
    session_history: &[Message],
    question: &str,
) -> String {
    let mut prompt = String::with_capacity(
        system_context.len()
            + retrieved_chunks.iter().map(|c| c.len() + 2).sum::<usize>()
            + session_history.iter().map(|m| m.content.len() + 12).sum::<usize>()
            + question.len()
            + 32,
    );
    let system_context = system_context.trim();
    if !system_context.is_empty() {
        prompt.push_str(system_context);
        prompt.push_str("\n\n");
    }
    prompt.push_str("Context:\n");
    prompt.push_str(&retrieved_chunks.join("\n\n"));
    prompt.push_str("\n\n");

    if !session_history.is_empty() {
        prompt.push_str("Conversation:\n");
        for message in session_history {
            prompt.push_str(message.role.as_str());
            prompt.push_str(": ");
            prompt.push_str(&message.content);
            prompt.push('\n');
        }
        prompt.push('\n');
    }

    prompt.push_str("Question: ");
    prompt.push_str(question);
    prompt.push('\n');
    prompt
}
