use std::convert::TryFrom;

use nom::branch::alt;
use nom::bytes::complete::{escaped, is_not, tag, take_while};
use nom::character::complete::{
    alpha1, alphanumeric1, anychar, char, digit1, multispace0, none_of, one_of,
};
use nom::combinator::{all_consuming, map, map_res, not, opt, recognize, rest};
use nom::multi::{many0, many1, separated_list0, separated_list1};
use nom::sequence::{delimited, pair, preceded, separated_pair, terminated, tuple};
use nom::IResult;
use thiserror::Error;

use crate::expr::{BinOp, Expr, UnaryOp};
use crate::locus::Locus;
use crate::record::{CigarOp, ReadRecord};
use crate::types::{ContigDef, FilterDef, InfoDef, InfoNumber, InfoType, Metadata, Value, VcfHeader};

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed expression `{0}`")]
    Expression(String),
    #[error("malformed locus `{0}` (expected contig:start[-end] or contig/start[-end])")]
    Locus(String),
    #[error("malformed record line `{0}`")]
    Record(String),
}

// ---------------------------------------------------------------------------
// expression grammar
//
// precedence, lowest to highest:
//   or  ->  and  ->  not  ->  comparison  ->  + -  ->  * /  ->  unary -
//   ->  postfix (.name, [key])  ->  primary

const KEYWORDS: &[&str] = &[
    "and", "or", "not", "in", "true", "false", "True", "False", "None", "null",
];

fn ws<'a, F, O>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

fn identifier(input: &str) -> IResult<&str, &str> {
    nom::combinator::verify(
        recognize(pair(
            alt((alpha1, tag("_"))),
            many0(alt((alphanumeric1, tag("_")))),
        )),
        |s: &str| !KEYWORDS.contains(&s),
    )(input)
}

/// A word operator; must not match a prefix of a longer identifier.
fn word<'a>(kw: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    terminated(
        tag(kw),
        not(nom::character::complete::satisfy(|c: char| {
            c.is_alphanumeric() || c == '_'
        })),
    )
}

fn number(input: &str) -> IResult<&str, Expr> {
    fn exponent(input: &str) -> IResult<&str, &str> {
        recognize(tuple((one_of("eE"), opt(one_of("+-")), digit1)))(input)
    }
    alt((
        map(
            map_res(
                alt((
                    recognize(tuple((digit1, char('.'), opt(digit1), opt(exponent)))),
                    recognize(pair(digit1, exponent)),
                )),
                str::parse::<f64>,
            ),
            |f| Expr::Literal(Value::Float(f)),
        ),
        map(map_res(digit1, str::parse::<i64>), |i| {
            Expr::Literal(Value::Int(i))
        }),
    ))(input)
}

fn quoted(input: &str) -> IResult<&str, &str> {
    alt((
        delimited(char('\''), take_while(|c| c != '\''), char('\'')),
        delimited(char('"'), take_while(|c| c != '"'), char('"')),
    ))(input)
}

fn primary(input: &str) -> IResult<&str, Expr> {
    alt((
        map(quoted, |s| Expr::Literal(Value::Str(s.to_owned()))),
        number,
        map(alt((word("true"), word("True"))), |_| {
            Expr::Literal(Value::Bool(true))
        }),
        map(alt((word("false"), word("False"))), |_| {
            Expr::Literal(Value::Bool(false))
        }),
        map(alt((word("None"), word("null"))), |_| {
            Expr::Literal(Value::Missing)
        }),
        map(identifier, |s| Expr::Ident(s.to_owned())),
        delimited(ws(char('(')), expression, ws(char(')'))),
    ))(input)
}

enum Trailer<'a> {
    Attr(&'a str),
    Index(Expr),
}

fn postfix(input: &str) -> IResult<&str, Expr> {
    let (input, base) = primary(input)?;
    let (input, trailers) = many0(alt((
        map(preceded(char('.'), identifier), Trailer::Attr),
        map(
            delimited(char('['), ws(expression), char(']')),
            Trailer::Index,
        ),
    )))(input)?;
    let expr = trailers.into_iter().fold(base, |acc, trailer| match trailer {
        Trailer::Attr(name) => Expr::Attr(Box::new(acc), name.to_owned()),
        Trailer::Index(key) => Expr::Index(Box::new(acc), Box::new(key)),
    });
    Ok((input, expr))
}

fn factor(input: &str) -> IResult<&str, Expr> {
    alt((
        map(preceded(ws(char('-')), factor), |e| {
            Expr::Unary(UnaryOp::Neg, Box::new(e))
        }),
        postfix,
    ))(input)
}

fn term(input: &str) -> IResult<&str, Expr> {
    let (input, first) = factor(input)?;
    let (input, rest) = many0(pair(
        ws(alt((
            map(char('*'), |_| BinOp::Mul),
            map(char('/'), |_| BinOp::Div),
        ))),
        factor,
    ))(input)?;
    Ok((input, fold_binary(first, rest)))
}

fn additive(input: &str) -> IResult<&str, Expr> {
    let (input, first) = term(input)?;
    let (input, rest) = many0(pair(
        ws(alt((
            map(char('+'), |_| BinOp::Add),
            map(char('-'), |_| BinOp::Sub),
        ))),
        term,
    ))(input)?;
    Ok((input, fold_binary(first, rest)))
}

fn comparison_op(input: &str) -> IResult<&str, BinOp> {
    alt((
        map(tag("=="), |_| BinOp::Eq),
        map(tag("!="), |_| BinOp::Ne),
        map(tag("<="), |_| BinOp::Le),
        map(tag(">="), |_| BinOp::Ge),
        map(char('<'), |_| BinOp::Lt),
        map(char('>'), |_| BinOp::Gt),
        map(word("in"), |_| BinOp::In),
    ))(input)
}

fn comparison(input: &str) -> IResult<&str, Expr> {
    let (input, lhs) = additive(input)?;
    let (input, tail) = opt(pair(ws(comparison_op), additive))(input)?;
    Ok((
        input,
        match tail {
            Some((op, rhs)) => Expr::Binary(op, Box::new(lhs), Box::new(rhs)),
            None => lhs,
        },
    ))
}

fn negation(input: &str) -> IResult<&str, Expr> {
    alt((
        map(
            preceded(ws(alt((word("not"), tag("!")))), negation),
            |e| Expr::Unary(UnaryOp::Not, Box::new(e)),
        ),
        comparison,
    ))(input)
}

fn conjunction(input: &str) -> IResult<&str, Expr> {
    let (input, first) = negation(input)?;
    let (input, rest) = many0(preceded(
        ws(alt((word("and"), tag("&&")))),
        negation,
    ))(input)?;
    Ok((
        input,
        rest.into_iter().fold(first, |acc, rhs| {
            Expr::Binary(BinOp::And, Box::new(acc), Box::new(rhs))
        }),
    ))
}

fn expression(input: &str) -> IResult<&str, Expr> {
    let (input, first) = conjunction(input)?;
    let (input, rest) = many0(preceded(
        ws(alt((word("or"), tag("||")))),
        conjunction,
    ))(input)?;
    Ok((
        input,
        rest.into_iter().fold(first, |acc, rhs| {
            Expr::Binary(BinOp::Or, Box::new(acc), Box::new(rhs))
        }),
    ))
}

fn fold_binary(first: Expr, rest: Vec<(BinOp, Expr)>) -> Expr {
    rest.into_iter().fold(first, |acc, (op, rhs)| {
        Expr::Binary(op, Box::new(acc), Box::new(rhs))
    })
}

pub fn parse_expression(input: &str) -> Result<Expr, ParseError> {
    all_consuming(ws(expression))(input)
        .map(|(_, expr)| expr)
        .map_err(|_| ParseError::Expression(input.to_owned()))
}

/// Split a raw filter token into an optional `name:` prefix and the parsed
/// expression. Whether the name refers to a source or a column label is the
/// caller's business.
pub fn parse_filter_token(input: &str) -> Result<(Option<String>, Expr), ParseError> {
    let named: IResult<&str, &str> = terminated(identifier, char(':'))(input);
    if let Ok((remainder, name)) = named {
        if let Ok(expr) = parse_expression(remainder) {
            return Ok((Some(name.to_owned()), expr));
        }
    }
    parse_expression(input).map(|expr| (None, expr))
}

// ---------------------------------------------------------------------------
// loci

fn locus(input: &str) -> IResult<&str, Locus> {
    let (input, contig) = is_not(":/")(input)?;
    let (input, sep) = one_of(":/")(input)?;
    let (input, start) = map_res(digit1, str::parse::<u64>)(input)?;
    let (input, end) = opt(preceded(char('-'), map_res(digit1, str::parse::<u64>)))(input)?;
    let locus = match sep {
        // one-based inclusive endpoints
        ':' => {
            if start == 0 {
                return Err(nom::Err::Error(nom::error::Error::new(
                    input,
                    nom::error::ErrorKind::Verify,
                )));
            }
            Locus::interbase(contig, start - 1, end.unwrap_or(start))
        }
        // interbase, end-exclusive
        _ => Locus::interbase(contig, start, end.unwrap_or(start + 1)),
    };
    Ok((input, locus))
}

pub fn parse_locus(input: &str) -> Result<Locus, ParseError> {
    let parsed: IResult<&str, Locus> = all_consuming(locus)(input);
    parsed
        .map(|(_, locus)| locus)
        .map_err(|_| ParseError::Locus(input.to_owned()))
}

// ---------------------------------------------------------------------------
// VCF header meta lines, e.g.
// ##INFO=<ID=DP,Number=1,Type=Integer,Description="Total Depth">

pub(crate) fn info_number(input: &str) -> IResult<&str, InfoNumber> {
    let counted: IResult<&str, usize> = map_res(digit1, str::parse)(input);
    if let Ok((input, number)) = counted {
        Ok((input, InfoNumber::Count(number)))
    } else {
        let (input, symbol) = alt((alpha1, tag(".")))(input)?;
        let number = match symbol {
            "A" => InfoNumber::AlternateAlleles,
            "R" => InfoNumber::Alleles,
            "G" => InfoNumber::Genotypes,
            _ => InfoNumber::Unknown,
        };
        Ok((input, number))
    }
}

fn meta_string(input: &str) -> IResult<&str, &str> {
    delimited(
        tag("\""),
        map(opt(escaped(none_of("\\\""), '\\', one_of("\\\""))), |s| {
            s.unwrap_or("")
        }),
        tag("\""),
    )(input)
}

fn keys_and_values(input: &str) -> IResult<&str, Vec<(&str, &str)>> {
    fn key_value(input: &str) -> IResult<&str, (&str, &str)> {
        separated_pair(is_not("<,="), tag("="), alt((meta_string, is_not(">,="))))(input)
    }
    separated_list0(tag(","), key_value)(input)
}

#[derive(Debug)]
pub(crate) enum MetaValue {
    Info(InfoDef),
    Filter(FilterDef),
    Contig(ContigDef),
    Other(String),
}

pub(crate) fn meta_entry(input: &str) -> IResult<&str, (&str, MetaValue)> {
    let (input, _) = tag("##")(input)?;
    let (input, key) = is_not("=")(input)?;
    let (input, _) = tag("=")(input)?;
    let value = match key {
        "INFO" => MetaValue::Info(InfoDef::from(
            delimited(tag("<"), keys_and_values, tag(">"))(input)?.1,
        )),
        "FILTER" => MetaValue::Filter(FilterDef::from(
            delimited(tag("<"), keys_and_values, tag(">"))(input)?.1,
        )),
        "contig" => MetaValue::Contig(ContigDef::from(
            delimited(tag("<"), keys_and_values, tag(">"))(input)?.1,
        )),
        _ => MetaValue::Other(input.to_owned()),
    };
    Ok(("", (key, value)))
}

pub(crate) fn column_line(input: &str) -> IResult<&str, Vec<&str>> {
    preceded(tag("#"), separated_list1(char('\t'), is_not("\t")))(input)
}

// ---------------------------------------------------------------------------
// VCF record lines

#[derive(Debug)]
pub(crate) struct RawVcfRecord<'a> {
    pub(crate) chrom: &'a str,
    pub(crate) pos: u64,
    pub(crate) id: &'a str,
    pub(crate) ref_allele: &'a str,
    pub(crate) alt_alleles: Vec<&'a str>,
    pub(crate) qual: Option<f64>,
    pub(crate) filters: Vec<&'a str>,
    pub(crate) info: &'a str,
}

fn field(input: &str) -> IResult<&str, &str> {
    is_not("\t")(input)
}

fn tab(input: &str) -> IResult<&str, char> {
    char('\t')(input)
}

pub(crate) fn vcf_record(input: &str) -> IResult<&str, RawVcfRecord> {
    let (input, chrom) = field(input)?;
    let (input, _) = tab(input)?;
    let (input, pos) = map_res(digit1, str::parse)(input)?;
    let (input, _) = tab(input)?;
    let (input, id) = field(input)?;
    let (input, _) = tab(input)?;
    let (input, ref_allele) = field(input)?;
    let (input, _) = tab(input)?;
    let (input, alt) = field(input)?;
    let (input, _) = tab(input)?;
    let (input, qual) = field(input)?;
    let (input, _) = tab(input)?;
    let (input, filter) = field(input)?;
    let (input, _) = tab(input)?;
    let (input, info) = field(input)?;
    // FORMAT and sample columns, if any, are not our concern
    let (input, _) = rest(input)?;
    Ok((
        input,
        RawVcfRecord {
            chrom,
            pos,
            id,
            ref_allele,
            alt_alleles: if alt == "." {
                vec![]
            } else {
                alt.split(',').collect()
            },
            qual: if qual == "." { None } else { qual.parse().ok() },
            filters: if filter == "." || filter.is_empty() {
                vec![]
            } else {
                filter.split(';').collect()
            },
            info,
        },
    ))
}

/// Type INFO values against the header definitions; undeclared keys fall
/// back to inference.
pub(crate) fn info_fields(input: &str, header: &VcfHeader) -> Metadata {
    let mut metadata = Metadata::new();
    if input == "." || input.is_empty() {
        return metadata;
    }
    for item in input.split(';') {
        let mut kv = item.splitn(2, '=');
        let key = kv.next().unwrap_or("");
        if key.is_empty() {
            continue;
        }
        let def = header.info().get(key);
        let value = match kv.next() {
            None => Value::Bool(true),
            Some(raw) => {
                let mut atoms: Vec<Value> = raw.split(',').map(|a| info_atom(a, def)).collect();
                if atoms.len() == 1 && def.map(InfoDef::is_scalar).unwrap_or(true) {
                    atoms.pop().unwrap()
                } else {
                    Value::List(atoms)
                }
            }
        };
        metadata.insert(key.to_owned(), value);
    }
    metadata
}

fn info_atom(raw: &str, def: Option<&InfoDef>) -> Value {
    if raw == "." {
        return Value::Missing;
    }
    match def.map(|d| d.kind()) {
        Some(&InfoType::Integer) => raw
            .parse::<i64>()
            .map(Value::Int)
            .unwrap_or_else(|_| Value::Str(raw.to_owned())),
        Some(&InfoType::Float) => raw
            .parse::<f64>()
            .map(Value::Float)
            .unwrap_or_else(|_| Value::Str(raw.to_owned())),
        Some(&InfoType::Flag) => Value::Bool(true),
        Some(&InfoType::Character) | Some(&InfoType::String) => Value::Str(raw.to_owned()),
        None => raw
            .parse::<i64>()
            .map(Value::Int)
            .or_else(|_| raw.parse::<f64>().map(Value::Float))
            .unwrap_or_else(|_| Value::Str(raw.to_owned())),
    }
}

// ---------------------------------------------------------------------------
// SAM record lines

fn cigar_ops(input: &str) -> IResult<&str, Vec<(u32, CigarOp)>> {
    many1(pair(
        map_res(digit1, str::parse),
        map_res(anychar, |c| CigarOp::try_from(c as u8)),
    ))(input)
}

pub(crate) fn sam_record(input: &str) -> IResult<&str, ReadRecord> {
    let (input, qname) = field(input)?;
    let (input, _) = tab(input)?;
    let (input, flags) = map_res(digit1, str::parse)(input)?;
    let (input, _) = tab(input)?;
    let (input, rname) = field(input)?;
    let (input, _) = tab(input)?;
    let (input, pos) = map_res(digit1, str::parse)(input)?;
    let (input, _) = tab(input)?;
    let (input, mapq) = map_res(digit1, str::parse)(input)?;
    let (input, _) = tab(input)?;
    let (input, cigar_field) = field(input)?;
    let (input, _) = tab(input)?;
    let (input, rnext) = field(input)?;
    let (input, _) = tab(input)?;
    let (input, pnext) = map_res(digit1, str::parse)(input)?;
    let (input, _) = tab(input)?;
    let (input, tlen) = map_res(
        recognize(pair(opt(char('-')), digit1)),
        str::parse::<i64>,
    )(input)?;
    let (input, _) = tab(input)?;
    let (input, seq) = field(input)?;
    let (input, _) = tab(input)?;
    let (input, qual) = field(input)?;
    let (input, tags) = many0(preceded(tab, field))(input)?;

    let cigar = if cigar_field == "*" {
        vec![]
    } else {
        all_consuming(cigar_ops)(cigar_field)?.1
    };

    Ok((
        input,
        ReadRecord {
            name: qname.to_owned(),
            flags,
            contig: rname.to_owned(),
            pos,
            mapping_quality: mapq,
            cigar,
            mate_contig: rnext.to_owned(),
            mate_pos: pnext,
            template_length: tlen,
            sequence: seq.to_owned(),
            base_qualities: qual.to_owned(),
            tags: tags.into_iter().map(str::to_owned).collect(),
        },
    ))
}
