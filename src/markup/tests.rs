use super::*;

#[test]
fn paragraphs_are_separated_by_blank_lines() {
    let markdown = "# Kinematics\n\nForward kinematics maps joint angles\nto positions.\n\nInverse kinematics goes the other way.";

    let text = strip_markdown(markdown);

    assert_eq!(
        text,
        "Kinematics\n\nForward kinematics maps joint angles\nto positions.\n\nInverse kinematics goes the other way."
    );
}

#[test]
fn inline_markup_keeps_only_text() {
    let markdown = "A **strong** and *gentle* [link](https://example.com) to `torque()` and ![a robot](robot.png).";

    let text = strip_markdown(markdown);

    assert_eq!(text, "A strong and gentle link to torque() and a robot.");
}

#[test]
fn html_tags_are_removed() {
    let markdown = "<div class=\"note\">\nImportant <b>safety</b> note\n</div>\n\nAfter the block with <span>inline</span> html.";

    let text = strip_markdown(markdown);

    assert!(!text.contains('<'));
    assert!(text.contains("Important safety note"));
    assert!(text.ends_with("After the block with inline html."));
}

#[test]
fn tags_spanning_lines_are_removed() {
    let markdown = "Intro paragraph.\n\n<iframe\n  width=\"560\"\n  src=\"https://example.com/v\"\n></iframe>\n\nAfter.";

    let text = strip_markdown(markdown);

    assert_eq!(text, "Intro paragraph.\n\nAfter.");
}

#[test]
fn front_matter_is_skipped() {
    let markdown = "---\ntitle: Sensors\nsidebar_position: 2\n---\n\n# Sensors\n\nIMUs measure acceleration.";

    let text = strip_markdown(markdown);

    assert_eq!(text, "Sensors\n\nIMUs measure acceleration.");
}

#[test]
fn list_items_stay_in_one_block() {
    let markdown = "Components:\n\n- motors\n- sensors\n- controllers\n\nEnd.";

    let text = strip_markdown(markdown);

    assert_eq!(text, "Components:\n\nmotors\nsensors\ncontrollers\n\nEnd.");
}

#[test]
fn code_blocks_keep_their_content() {
    let markdown = "Run this:\n\n```python\nrobot.walk()\n```\n\nDone.";

    let text = strip_markdown(markdown);

    assert_eq!(text, "Run this:\n\nrobot.walk()\n\nDone.");
}

#[test]
fn empty_markdown() {
    assert_eq!(strip_markdown(""), "");
    assert_eq!(strip_markdown("<!-- only a comment -->"), "");
}
