use super::*;

fn ops(stream: &CommandStream) -> Vec<(String, String, ValueOp, String)> {
    stream
        .commands()
        .iter()
        .map(|c| {
            (
                c.section.clone(),
                c.key.clone(),
                c.op(),
                c.value.raw().to_string(),
            )
        })
        .collect()
}

#[test]
fn parses_every_sigil_in_file_order() {
    let text = "\
[Core.System]
Paths=a
.Paths=b
+Paths=c
-Paths=a
!Old=ignored
^Empty=
@Row=Id
*Obj=Name
";
    let stream = parse_stream("Base.ini", text);
    assert!(stream.diagnostics().is_empty());
    let parsed = ops(&stream);
    let kinds: Vec<ValueOp> = parsed.iter().map(|p| p.2).collect();
    assert_eq!(
        kinds,
        vec![
            ValueOp::Set,
            ValueOp::Append,
            ValueOp::AddUnique,
            ValueOp::Remove,
            ValueOp::Clear,
            ValueOp::InitializeToEmpty,
            ValueOp::StructKeyed,
            ValueOp::PerObjectStructKeyed,
        ]
    );
    assert_eq!(parsed[0].1, "Paths");
    assert_eq!(parsed[5].3, "");
}

#[test]
fn skips_malformed_lines_and_keeps_going() {
    let text = "\
orphan=1
[S]
no separator here
=novalue
@Row=(=5)
Good=yes
";
    let stream = parse_stream("Bad.ini", text);
    assert_eq!(stream.len(), 1);
    assert_eq!(stream.commands()[0].key, "Good");
    let lines: Vec<usize> = stream.diagnostics().iter().map(|d| d.line).collect();
    assert_eq!(lines, vec![1, 3, 4, 5]);
}

#[test]
fn comments_and_whitespace_are_ignored() {
    let text = "; header comment\n// another\n[S]\n  Key  =  spaced value  \n~Packaged=1\n";
    let stream = parse_stream("c.ini", text);
    let parsed = ops(&stream);
    assert_eq!(parsed.len(), 2);
    assert_eq!(parsed[0].1, "Key");
    assert_eq!(parsed[0].3, "spaced value");
    assert_eq!(parsed[1].1, "Packaged");
}

#[test]
fn quoted_values_are_unescaped() {
    let stream = parse_stream("q.ini", "[S]\nMsg=\" two \\\"words\\\"\\n\"\n");
    assert_eq!(stream.commands()[0].value.raw(), " two \"words\"\n");
}

#[test]
fn macros_are_stored_unexpanded() {
    let stream = parse_stream("m.ini", "[S]\nDir={PROJECTDIR}Saved\n");
    assert_eq!(stream.commands()[0].value.raw(), "{PROJECTDIR}Saved");
}

#[test]
fn backslash_continues_line() {
    let stream = parse_stream("l.ini", "[S]\nLong=first \\\nsecond\nNext=1\n");
    assert_eq!(stream.commands()[0].value.raw(), "first second");
    assert_eq!(stream.commands()[1].key, "Next");
}

#[test]
fn value_may_contain_separator() {
    let stream = parse_stream("s.ini", "[S]\n+Row=(Id=5,Name=A)\n@Grid=Id=1,Size=2\n");
    assert_eq!(stream.commands()[0].value.raw(), "(Id=5,Name=A)");
    assert_eq!(stream.commands()[1].value.raw(), "Id=1,Size=2");
    assert_eq!(stream.commands()[1].op(), ValueOp::StructKeyed);
}

#[test]
fn read_stream_treats_missing_file_as_absent() {
    let dir = tempfile::tempdir().expect("tempdir");
    let missing = dir.path().join("Nope.ini");
    assert!(read_stream(&missing).expect("read").is_none());

    let present = dir.path().join("Yes.ini");
    std::fs::write(&present, "[S]\nK=V\n").expect("write");
    let stream = read_stream(&present).expect("read").expect("present");
    assert_eq!(stream.len(), 1);
    assert!(stream.name().ends_with("Yes.ini"));
}
