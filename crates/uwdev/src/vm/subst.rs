//! `@XY<num>` text substitution, applied when a string is emitted.
//!
//! `X` selects the source: `G` a game global (`mem[num]`), `S` a stack
//! variable (`mem[BP+num]`), `P` a pointer variable
//! (`mem[mem[BP+num]]`). `Y` selects the rendering: `I` as signed
//! decimal, `S` as the raw string with that id (raw deliberately: a
//! substituted string is never re-substituted). Malformed directives
//! are copied through verbatim.

use crate::vm::machine::Vm;

#[must_use]
pub fn substitute(text: &str, vm: &Vm) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(at) = rest.find('@') {
        out.push_str(&rest[..at]);
        let candidate = &rest[at..];
        match parse_directive(candidate) {
            Some((directive, consumed)) => {
                out.push_str(&resolve(directive, vm));
                rest = &candidate[consumed..];
            }
            None => {
                out.push('@');
                rest = &candidate[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

#[derive(Debug, Clone, Copy)]
struct Directive {
    source: char,
    render: char,
    number: i32,
}

/// Parse `@XY<num>` at the start of `text` (which begins with `@`).
/// Returns the directive and the byte length consumed.
fn parse_directive(text: &str) -> Option<(Directive, usize)> {
    let bytes = text.as_bytes();
    let source = *bytes.get(1)? as char;
    if !matches!(source, 'G' | 'S' | 'P') {
        return None;
    }
    let render = *bytes.get(2)? as char;
    if !matches!(render, 'I' | 'S') {
        return None;
    }
    let mut cursor = 3;
    if bytes.get(cursor) == Some(&b'-') {
        cursor += 1;
    }
    let digits_start = cursor;
    while bytes.get(cursor).is_some_and(u8::is_ascii_digit) {
        cursor += 1;
    }
    if cursor == digits_start {
        return None;
    }
    let number: i32 = text[3..cursor].parse().ok()?;
    Some((
        Directive {
            source,
            render,
            number,
        },
        cursor,
    ))
}

fn resolve(directive: Directive, vm: &Vm) -> String {
    let offset = directive.number as u16; // sign-extends small negatives
    let value = match directive.source {
        'G' => vm.get_mem(offset),
        'S' => vm.get_mem(vm.bp().wrapping_add(offset)),
        'P' => {
            let pointer = vm.get_mem(vm.bp().wrapping_add(offset));
            vm.get_mem(pointer)
        }
        _ => unreachable!("parse_directive only admits G/S/P"),
    };
    match directive.render {
        'I' => format!("{}", value as i16),
        'S' => vm.get_string_raw(value),
        _ => unreachable!("parse_directive only admits I/S"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strings::GameStrings;
    use crate::vm::machine::MemoryLayout;

    fn vm_with_strings() -> Vm {
        let mut vm = Vm::new(MemoryLayout::game());
        let mut strings = GameStrings::new();
        strings.insert_block(1, vec!["sword".to_string(), "a @SI0 b".to_string()]);
        vm.set_strings(strings);
        vm
    }

    #[test]
    fn stack_integer() {
        let mut vm = vm_with_strings();
        let bp = vm.bp();
        vm.set_mem(bp, 75);
        assert_eq!(substitute("HP: @SI0", &vm), "HP: 75");
    }

    #[test]
    fn negative_values_format_signed() {
        let mut vm = vm_with_strings();
        let bp = vm.bp();
        vm.set_mem(bp.wrapping_add(2), (-5i16) as u16);
        assert_eq!(substitute("delta @SI2!", &vm), "delta -5!");
    }

    #[test]
    fn global_and_pointer_sources() {
        let mut vm = vm_with_strings();
        vm.set_mem(4, 30);
        assert_eq!(substitute("@GI4", &vm), "30");

        let bp = vm.bp();
        vm.set_mem(bp.wrapping_add(1), 2000);
        vm.set_mem(2000, 9);
        assert_eq!(substitute("@PI1", &vm), "9");
    }

    #[test]
    fn string_render_is_raw_and_not_nested() {
        let mut vm = vm_with_strings();
        let bp = vm.bp();
        vm.set_mem(bp, 1); // string 1 itself contains a directive
        assert_eq!(substitute("<@SS0>", &vm), "<a @SI0 b>");
    }

    #[test]
    fn negative_offsets_parse() {
        let mut vm = vm_with_strings();
        let bp = vm.bp();
        vm.set_mem(bp.wrapping_sub(2), 11);
        assert_eq!(substitute("@SI-2", &vm), "11");
    }

    #[test]
    fn malformed_directives_stay_verbatim() {
        let vm = vm_with_strings();
        for text in ["@", "@Q1", "@SI", "@S5", "mail@example.com", "@GS"] {
            assert_eq!(substitute(text, &vm), text);
        }
    }

    #[test]
    fn multiple_directives_in_one_line() {
        let mut vm = vm_with_strings();
        let bp = vm.bp();
        vm.set_mem(bp, 1);
        vm.set_mem(bp.wrapping_add(1), 2);
        assert_eq!(substitute("@SI0+@SI1", &vm), "1+2");
    }
}
