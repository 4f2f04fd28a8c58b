use winnow::{
    binary::{be_i16, be_i32, be_u32, be_u64, u8},
    combinator::{eof, repeat, trace},
    error::{ContextError, ErrMode, StrContext, StrContextValue},
    stream::UpdateSlice,
    token::{literal, rest, take},
    Bytes, LocatingSlice, ModalResult, Parser,
};

use crate::atom::util::{Fixed16x16, Fixed8x8, FourCC};

pub type Stream<'i> = LocatingSlice<&'i Bytes>;

pub fn stream(b: &[u8]) -> Stream<'_> {
    LocatingSlice::new(Bytes::new(b))
}

pub fn fourcc(input: &mut Stream<'_>) -> ModalResult<FourCC> {
    trace(
        "fourcc",
        (byte_array)
            .map(FourCC)
            .context(StrContext::Label("fourcc")),
    )
    .parse_next(input)
}

pub fn version(input: &mut Stream<'_>) -> ModalResult<u8> {
    trace("version", u8)
        .context(StrContext::Label("version"))
        .parse_next(input)
}

pub fn be_u32_as_u64(input: &mut Stream<'_>) -> ModalResult<u64> {
    trace(
        "be_u32_as_u64",
        be_u32
            .map(u64::from)
            .context(StrContext::Expected(StrContextValue::Description("be u32"))),
    )
    .parse_next(input)
}

/// Parses a u32 for version 0 atoms and a u64 for version 1 atoms
pub fn be_u32_or_u64<'i>(version: u8) -> impl Parser<Stream<'i>, u64, ErrMode<ContextError>> {
    trace("be_u32_or_u64", move |input: &mut Stream<'i>| match version {
        0 => be_u32_as_u64.parse_next(input),
        _ => be_u64.parse_next(input),
    })
}

pub fn byte_array<const N: usize>(input: &mut Stream<'_>) -> ModalResult<[u8; N]> {
    trace(
        "byte_array",
        take(N).try_map(|data: &[u8]| <[u8; N]>::try_from(data)),
    )
    .parse_next(input)
}

pub fn rest_vec(input: &mut Stream<'_>) -> ModalResult<Vec<u8>> {
    trace("rest_vec", rest.map(|data: &[u8]| data.to_vec())).parse_next(input)
}

/// Parses a UTF8 string from the remainder of the buffer
pub fn utf8_string(input: &mut Stream<'_>) -> ModalResult<String> {
    trace(
        "utf8_string",
        rest.try_map(|data: &[u8]| String::from_utf8(data.to_vec()))
            .context(StrContext::Expected(StrContextValue::Description(
                "UTF8 string",
            ))),
    )
    .parse_next(input)
}

/// Parses a nested atom of type `atom_type` with a 32-bit size, running `parser` over exactly
/// its body
pub fn nested_atom<'i, O, P>(
    atom_type: &'static [u8; 4],
    mut parser: P,
) -> impl Parser<Stream<'i>, O, ErrMode<ContextError>>
where
    P: Parser<Stream<'i>, O, ErrMode<ContextError>>,
{
    trace("nested_atom", move |input: &mut Stream<'i>| {
        let size = be_u32
            .verify(|size: &u32| *size >= 8)
            .context(StrContext::Label("size"))
            .parse_next(input)?;
        literal(atom_type)
            .context(StrContext::Label("type"))
            .parse_next(input)?;
        let body = take(size as usize - 8).parse_next(input)?;
        let mut body = input.clone().update_slice(body);
        let output = parser.by_ref().parse_next(&mut body)?;
        eof.parse_next(&mut body)?;
        Ok(output)
    })
}

pub fn fixed_point_16x16(input: &mut Stream<'_>) -> ModalResult<Fixed16x16> {
    trace("fixed_point_16x16", be_i32.map(Fixed16x16)).parse_next(input)
}

pub fn fixed_point_8x8(input: &mut Stream<'_>) -> ModalResult<Fixed8x8> {
    trace("fixed_point_8x8", be_i16.map(Fixed8x8)).parse_next(input)
}

pub fn matrix(input: &mut Stream<'_>) -> ModalResult<[i32; 9]> {
    trace(
        "matrix",
        repeat(9, be_i32).map(|values: Vec<i32>| {
            let mut matrix = [0i32; 9];
            matrix.copy_from_slice(&values);
            matrix
        }),
    )
    .context(StrContext::Label("matrix"))
    .parse_next(input)
}
