use edgefuzz_core::context::ExecutionContext;
use edgefuzz_core::executor::TargetError;

/// Hand-instrumented `key=value` header parser with a planted bug.
///
/// Block ids follow the numbering the instrumentor would give this code: function entry first,
/// then branch bodies in source order, with value wrappers on the right operands of `&&`.
pub fn header_parser(data: &[u8], ctx: &mut ExecutionContext) -> Result<(), TargetError> {
    ctx.trace_block(1);
    let Ok(text) = std::str::from_utf8(data) else {
        ctx.trace_block(2);
        return Err(TargetError::Exception("input is not UTF-8".into()));
    };

    let mut version = None;
    for line in text.lines() {
        ctx.trace_block(3);
        let Some((key, value)) = line.split_once('=') else {
            ctx.trace_block(4);
            continue;
        };
        ctx.trace_block(5);
        match key.trim() {
            "version" => {
                ctx.trace_block(6);
                version = Some(value.trim());
            }
            "mode" if ctx.trace_value(7, version.is_some()) => {
                ctx.trace_block(8);
                let value = value.trim();
                if value.starts_with("fast")
                    && ctx.trace_value(9, version.is_some_and(|v| v.starts_with('2')))
                {
                    ctx.trace_block(10);
                    if value.len() > 5 && ctx.trace_value(11, value.ends_with('!')) {
                        ctx.trace_block(12);
                        let selector = value.as_bytes()[4];
                        // Off-by-one in the fast-mode table lookup.
                        let table = [1u8, 2, 4, 8];
                        let _ = table[usize::from(selector) - usize::from(b'0')];
                    }
                }
            }
            _ => ctx.trace_block(13),
        }
    }
    ctx.trace_block(14);
    Ok(())
}
