//! Reporting of unused field numbers per message.

use std::collections::{BTreeSet, HashSet};
use std::io::{self, Write};

use prost_types::DescriptorProto;
use prost_types::field_descriptor_proto::Type;
use protoplug_gen::Image;

/// Largest field number protobuf allows.
const MAX_FIELD_NUMBER: i32 = 536_870_911;

/// Half-open `[start, end)` ranges of occupied field numbers.
type Ranges = BTreeSet<(i32, i32)>;

/// Writes one line per message of every target file in `image`.
///
/// Nested messages are listed before the message containing them. Group
/// messages are folded into their parent, as their fields share its number
/// space.
pub(crate) fn write_free_field_numbers<W: Write>(image: &Image, out: &mut W) -> io::Result<()> {
    for file in image.files().iter().filter(|file| !file.is_import()) {
        let descriptor = file.descriptor();
        for message in &descriptor.message_type {
            write_message(&qualify(descriptor.package(), message.name()), message, out)?;
        }
    }
    Ok(())
}

fn qualify(scope: &str, name: &str) -> String {
    if scope.is_empty() {
        name.to_owned()
    } else {
        format!("{scope}.{name}")
    }
}

fn write_message<W: Write>(full_name: &str, message: &DescriptorProto, out: &mut W) -> io::Result<()> {
    let mut ranges = Ranges::new();
    let mut nested = Vec::new();
    gather(full_name, message, &mut ranges, &mut nested);
    for (name, child) in nested {
        write_message(&name, child, out)?;
    }
    writeln!(out, "{}", format_free_numbers(full_name, &ranges))
}

fn gather<'a>(
    full_name: &str,
    message: &'a DescriptorProto,
    ranges: &mut Ranges,
    nested: &mut Vec<(String, &'a DescriptorProto)>,
) {
    for field in &message.field {
        let number = field.number();
        ranges.insert((number, number.saturating_add(1)));
    }
    for range in &message.extension_range {
        ranges.insert((range.start(), range.end()));
    }
    for range in &message.reserved_range {
        ranges.insert((range.start(), range.end()));
    }

    let groups: HashSet<&str> = message
        .field
        .iter()
        .filter(|field| field.r#type() == Type::Group)
        .map(|field| field.type_name().trim_start_matches('.'))
        .collect();
    for child in &message.nested_type {
        let child_name = qualify(full_name, child.name());
        if groups.contains(child_name.as_str()) {
            gather(&child_name, child, ranges, nested);
        } else {
            nested.push((child_name, child));
        }
    }
}

/// Formats `name` padded to 35 columns followed by its free ranges.
fn format_free_numbers(name: &str, ranges: &Ranges) -> String {
    let mut line = format!("{name:<35} free:");
    let mut next_free = 1_i32;
    for &(start, end) in ranges {
        if next_free < start {
            if next_free.saturating_add(1) == start {
                line.push_str(&format!(" {next_free}"));
            } else {
                line.push_str(&format!(" {next_free}-{}", start.saturating_sub(1)));
            }
        }
        next_free = next_free.max(end);
    }
    if next_free <= MAX_FIELD_NUMBER {
        line.push_str(&format!(" {next_free}-INF"));
    }
    line
}
