use tracing::debug;

use crate::graph::state::TaskState;
use crate::sandbox;

const EXPRESSION_CHARS: &str = "0123456789+-*/().%^ ";

/// Strip everything but arithmetic characters from a model reply.
pub fn clean_expression(reply: &str) -> String {
    reply
        .chars()
        .filter(|c| EXPRESSION_CHARS.contains(*c))
        .collect::<String>()
        .trim()
        .to_string()
}

pub async fn run(state: &mut TaskState, ctx: &super::NodeContext) -> &'static str {
    let prompt = format!(
        "Extract a single arithmetic expression from this task:\n{}",
        state.task
    );
    let expr = clean_expression(&ctx.ask(&prompt, None).await);

    match sandbox::evaluate(&expr) {
        Ok(value) => state.note(format!("MATH: {} = {}", expr, value)),
        Err(e) => {
            debug!(expr = %expr, error = %e, "Expression rejected");
            state.note(format!("MATH-ERROR: {} ({})", expr, e));
        }
    }
    "route"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_expression() {
        assert_eq!(clean_expression("The answer is `5*7`."), "5*7.");
        assert_eq!(clean_expression("  (2 + 3) ^ 2\n"), "(2 + 3) ^ 2");
        assert_eq!(clean_expression("__import__('os')"), "()");
        assert_eq!(clean_expression("none"), "");
    }
}
