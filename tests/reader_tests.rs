/// Reader integration tests: full playthroughs of fixture documents.
use screech::core::compound::{CompoundText, Piece};
use screech::core::parser::{parse_collect, ParseOptions};
use screech::core::reader::{Output, Reader};
use screech::core::template::Template;
use screech::schema::content::{Condition, Once, Value};
use std::sync::Arc;

fn tavern() -> Arc<screech::schema::node::Tree> {
    let source = std::fs::read_to_string("tests/fixtures/tavern.screech").unwrap();
    let doc = Template::from_source(&source, vec![Once::arg()]).unwrap();
    let (tree, issues) = parse_collect(&doc, &ParseOptions::default()).unwrap();
    assert!(issues.is_empty());
    Arc::new(tree)
}

/// Advance until the next choice set or the end, collecting lines.
fn lines_until_pause(reader: &mut Reader) -> Vec<String> {
    let mut lines = Vec::new();
    while reader.advance() {
        match reader.output() {
            Some(Output::Line(t)) => lines.push(t.render()),
            Some(Output::Choices(_)) => break,
            None => unreachable!("advance returned true without output"),
        }
    }
    lines
}

#[test]
fn order_a_drink() {
    let mut reader = Reader::new(tavern(), ());
    assert_eq!(
        lines_until_pause(&mut reader),
        ["Welcome to the Crooked Lantern.", "A fire crackles in the hearth."]
    );
    assert!(reader.is_choice());
    let options: Vec<String> = reader.choices().iter().map(|t| t.render()).collect();
    assert_eq!(options, ["Order a drink", "Ask about rumours", "Leave"]);

    reader.choose(0);
    assert_eq!(
        lines_until_pause(&mut reader),
        ["The barkeep slides over a mug.", "You drop a coin on the counter."]
    );
    assert!(!reader.is_choice());
    assert!(!reader.advance());
}

#[test]
fn rumour_is_told_once_per_gate() {
    let mut reader = Reader::new(tavern(), ());
    lines_until_pause(&mut reader);
    reader.choose(1);
    assert_eq!(
        lines_until_pause(&mut reader),
        ["The barkeep leans in.", "They say the mill is haunted."]
    );

    reader.reset();
    lines_until_pause(&mut reader);
    reader.choose(1);
    assert!(lines_until_pause(&mut reader).is_empty());
}

#[test]
fn readers_share_one_tree() {
    let tree = tavern();
    let mut first = Reader::new(Arc::clone(&tree), ());
    let mut second = Reader::new(Arc::clone(&tree), ());

    lines_until_pause(&mut first);
    first.choose(2);
    assert_eq!(lines_until_pause(&mut first), ["You step back into the rain."]);

    // The second session is unaffected by the first.
    assert_eq!(lines_until_pause(&mut second).len(), 2);
    assert_eq!(second.choices().len(), 3);
}

#[test]
fn conditions_read_host_context() {
    #[derive(Debug, Default)]
    struct Inventory {
        coins: u32,
    }

    let rich = Condition::on::<Inventory, _>("rich", |inv| inv.coins >= 10).arg();
    let doc = Template::from_source(
        "> {0}Buy the round\n> Nurse your drink\n",
        vec![rich],
    )
    .unwrap();
    let (tree, _) = parse_collect(&doc, &ParseOptions::default()).unwrap();
    let tree = Arc::new(tree);

    let mut poor = Reader::new(Arc::clone(&tree), Inventory::default());
    assert!(poor.advance());
    assert_eq!(poor.choices().len(), 1);

    let mut wealthy = Reader::new(tree, Inventory { coins: 12 });
    assert!(wealthy.advance());
    assert_eq!(wealthy.choices().len(), 2);
    wealthy.context_mut::<Inventory>().unwrap().coins = 0;
    assert!(wealthy.context().downcast_ref::<Inventory>().is_some());
}

#[test]
fn emitted_line_plays_back_as_compound_text() {
    let name = Value::String("Mara".to_string()).arg();
    let doc = Template::from_source("Hello, {0}. I am {1,3} years old.\n", vec![name, Value::Int(9).arg()]).unwrap();
    let (tree, _) = parse_collect(&doc, &ParseOptions::default()).unwrap();
    let mut reader = Reader::new(Arc::new(tree), ());

    assert!(reader.advance());
    let line = reader.current_line().unwrap();
    let compound = CompoundText::from(line);
    assert_eq!(compound.contents().len(), 2);
    assert_eq!(compound.render(), "Hello, Mara. I am   9 years old.");

    let mut typed = String::new();
    for piece in compound.pieces() {
        match piece {
            Piece::Text(text) => typed.extend(text.chars()),
            Piece::Content(content) => typed.push_str(&content.render()),
        }
    }
    assert_eq!(typed, line.render());
}
