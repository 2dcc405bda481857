/// Scan forward from just past an opening brace (depth 1) and return the byte
/// offset of the matching closing brace, i.e. the exclusive end of the body.
///
/// Depth starts at 1, increments on `{`, decrements on `}`, and the scan stops
/// the moment depth returns to 0; depth can never go negative before that
/// point. Runs in linear time over the body.
///
/// Brace characters inside string/char literals and comments are NOT excluded
/// from the count. On source that embeds an unbalanced brace in a literal this
/// mis-locates the body end. Known limitation of the lexical approach.
pub fn body_end(content: &str, after_open: usize) -> Option<usize> {
    let bytes = content.as_bytes();
    let mut depth = 1usize;
    let mut pos = after_open;

    // Byte-wise scan is UTF-8 safe: continuation bytes never equal b'{'/b'}'.
    while pos < bytes.len() {
        match bytes[pos] {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(pos);
                }
            }
            _ => {}
        }
        pos += 1;
    }

    None
}
