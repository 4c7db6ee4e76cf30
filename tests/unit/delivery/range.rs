use super::*;

#[test]
fn parses_the_three_forms() {
    assert_eq!(
        ByteRange::parse("bytes=0-99").unwrap(),
        ByteRange::Bounded { start: 0, end: 99 }
    );
    assert_eq!(ByteRange::parse("bytes=100-").unwrap(), ByteRange::From(100));
    assert_eq!(ByteRange::parse(" bytes=-5 ").unwrap(), ByteRange::Suffix(5));
    assert_eq!("bytes=3-3".parse::<ByteRange>().unwrap().to_string(), "bytes=3-3");
}

#[test]
fn rejects_malformed_specs() {
    for input in ["0-5", "bytes=", "bytes=-", "bytes=a-b", "bytes=5-2", "bytes=0-1,4-5", "items=0-1"] {
        let err = ByteRange::parse(input).unwrap_err();
        assert_eq!(err.kind(), "validation", "{input}");
    }
}

#[test]
fn resolves_against_size() {
    let r = |s: &str| ByteRange::parse(s).unwrap();
    assert_eq!(r("bytes=0-9").resolve(100).unwrap(), (0, 9));
    assert_eq!(r("bytes=90-500").resolve(100).unwrap(), (90, 99));
    assert_eq!(r("bytes=10-").resolve(100).unwrap(), (10, 99));
    assert_eq!(r("bytes=-10").resolve(100).unwrap(), (90, 99));
    assert_eq!(r("bytes=-500").resolve(100).unwrap(), (0, 99));
}

#[test]
fn unsatisfiable_ranges() {
    let r = |s: &str| ByteRange::parse(s).unwrap();
    for (input, size) in [
        ("bytes=100-200", 100),
        ("bytes=100-", 100),
        ("bytes=-0", 100),
        ("bytes=0-0", 0),
    ] {
        match r(input).resolve(size) {
            Err(FramecastError::RangeNotSatisfiable { range, size: s }) => {
                assert_eq!(range, input);
                assert_eq!(s, size);
            }
            other => panic!("{input}: unexpected {other:?}"),
        }
    }
}
