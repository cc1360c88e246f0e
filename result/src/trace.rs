//! Reconstruction of the program invocation trace from transaction logs.

use crate::types::{TraceEntry, TraceStatus};

enum LogLine<'a> {
    Invoke {
        program: &'a str,
        depth: Option<u32>,
    },
    Outcome {
        program: &'a str,
        status: TraceStatus,
    },
    Message,
}

fn is_program_id(token: &str) -> bool {
    !token.is_empty() && token.chars().all(|c| c.is_ascii_alphanumeric())
}

fn classify(line: &str) -> LogLine<'_> {
    let Some(rest) = line.strip_prefix("Program ") else {
        return LogLine::Message;
    };
    let Some((program, rest)) = rest.split_once(' ') else {
        return LogLine::Message;
    };
    if !is_program_id(program) {
        return LogLine::Message;
    }

    if let Some(bracketed) = rest.strip_prefix("invoke [") {
        let depth = bracketed
            .split_once(']')
            .and_then(|(depth, _)| depth.parse::<u32>().ok())
            .filter(|depth| *depth > 0);
        return LogLine::Invoke { program, depth };
    }
    if rest.starts_with("success") {
        return LogLine::Outcome {
            program,
            status: TraceStatus::Success,
        };
    }
    if rest.starts_with("failed") {
        return LogLine::Outcome {
            program,
            status: TraceStatus::Failed,
        };
    }
    LogLine::Message
}

/// Parse raw transaction log lines into invocation frames.
///
/// Frames are emitted in invocation order, so a parent always precedes its
/// children. An outcome line marks the nearest open frame of the same program
/// and then pops the stack, whether or not such a frame was found. Any other
/// line belongs to the innermost open frame and is dropped when no frame is
/// open.
pub fn parse_transaction_logs<S: AsRef<str>>(lines: &[S]) -> Vec<TraceEntry> {
    let mut output: Vec<TraceEntry> = Vec::new();
    // Indices into `output` of the currently open frames.
    let mut stack: Vec<usize> = Vec::new();

    for line in lines {
        let line = line.as_ref();
        match classify(line) {
            LogLine::Invoke { program, depth } => {
                let depth = depth.unwrap_or(stack.len() as u32 + 1);
                output.push(TraceEntry {
                    program: program.to_string(),
                    depth,
                    status: TraceStatus::Invoke,
                    logs: Vec::new(),
                });
                stack.push(output.len() - 1);
            }
            LogLine::Outcome { program, status } => {
                if let Some(&index) = stack
                    .iter()
                    .rev()
                    .find(|&&index| output[index].program == program)
                {
                    output[index].status = status;
                }
                stack.pop();
            }
            LogLine::Message => {
                if let Some(&index) = stack.last() {
                    output[index].logs.push(line.to_string());
                }
            }
        }
    }

    output
}
