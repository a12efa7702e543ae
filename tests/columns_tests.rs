use quizgrader::columns;

#[test]
fn index_handles_single_and_double_letters() {
    assert_eq!(columns::index("A").expect("A should resolve"), 0);
    assert_eq!(columns::index("Z").expect("Z should resolve"), 25);
    assert_eq!(columns::index("AA").expect("AA should resolve"), 26);
    assert_eq!(columns::index("AB").expect("AB should resolve"), 27);
}

#[test]
fn index_accepts_lowercase() {
    assert_eq!(columns::index("q").expect("q should resolve"), 16);
}

#[test]
fn index_rejects_garbage() {
    assert!(columns::index("").is_err());
    assert!(columns::index("A1").is_err());
}

#[test]
fn letter_round_trips_with_index() {
    for (letters, index) in [("A", 0), ("Z", 25), ("AA", 26), ("AB", 27), ("BA", 52)] {
        assert_eq!(columns::letter(index), letters);
        assert_eq!(columns::index(letters).expect("should resolve"), index);
    }
}

#[test]
fn cell_returns_empty_past_the_row_end() {
    let row = vec!["a".to_string(), "b".to_string()];
    assert_eq!(columns::cell(&row, 1), "b");
    assert_eq!(columns::cell(&row, 5), "");
}

#[test]
fn cells_pads_to_the_full_range_width() {
    let row = vec!["a".to_string(), "b".to_string(), "c".to_string()];
    assert_eq!(columns::cells(&row, 1, 4), vec!["b", "c", "", ""]);
}

#[test]
fn split_a1_separates_column_and_row() {
    let (letters, row) = columns::split_a1("B12").expect("B12 should parse");
    assert_eq!(letters, "B");
    assert_eq!(row, 12);

    assert!(columns::split_a1("12").is_err());
    assert!(columns::split_a1("B").is_err());
}
