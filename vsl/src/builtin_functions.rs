use std::io::Write;

use vsl_vm::native::{BuiltinFunctions, NativeValue};

/// Returns the default [`BuiltinFunctions`] that should be used.
pub fn default_builtin_functions() -> BuiltinFunctions {
    let mut builtins = BuiltinFunctions::new();
    builtins.add_native_fn("printf", &printf);
    builtins
}

/// Formats `format` with `args`. Supports `%d` and `%%`; any other character is copied.
pub fn sprintf(format: &str, args: &[NativeValue<'_>]) -> Result<String, String> {
    let mut formatted = String::new();
    let mut args = args.iter();
    let mut chars = format.chars();

    while let Some(c) = chars.next() {
        if c != '%' {
            formatted.push(c);
            continue;
        }
        match chars.next() {
            Some('d') => match args.next() {
                Some(NativeValue::Int(value)) => formatted.push_str(&value.to_string()),
                Some(NativeValue::Str(_)) => return Err("%d expects an integer".to_string()),
                None => return Err("missing argument for %d".to_string()),
            },
            Some('%') => formatted.push('%'),
            Some(other) => {
                formatted.push('%');
                formatted.push(other);
            }
            None => formatted.push('%'),
        }
    }

    Ok(formatted)
}

/// `printf(format, ...)`. Returns the number of bytes written.
pub fn printf(args: &[NativeValue<'_>], output: &mut dyn Write) -> Result<i32, String> {
    let (format_str, args) = match args.split_first() {
        Some((NativeValue::Str(format_str), args)) => (*format_str, args),
        _ => return Err("printf expects a format string".to_string()),
    };

    let formatted = sprintf(format_str, args)?;
    output
        .write_all(formatted.as_bytes())
        .map_err(|err| err.to_string())?;
    Ok(formatted.len() as i32)
}
