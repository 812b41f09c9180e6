// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! A tiny expression/`gather(...)` evaluator used only by this crate's own
//! test suite to exercise suspend/resume end to end without a real sandboxed
//! language. Not part of the product surface — the real interpreter is an
//! external collaborator.
//!
//! Grammar (informal):
//! ```text
//! program  := stmt (';' stmt)* ';'?
//! stmt     := try_stmt | IDENT '=' expr | 'return' expr | expr
//! try_stmt := 'try' ':' 'await' call ';' 'return' literal 'except' ':' 'return' literal
//! expr     := primary ('+' primary)*
//! primary  := INT | STRING | 'gather' '(' expr (',' expr)* ')' | 'await' primary
//!           | IDENT '(' expr (',' expr)* ')' | IDENT '[' INT ']' | IDENT
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{InterpreterAdapter, InterpreterError, Outcome};
use crate::domain::{CallOutcome, PendingCallRequest};

type Env = HashMap<String, serde_json::Value>;

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Expr {
    Int(i64),
    Str(String),
    Add(Box<Expr>, Box<Expr>),
    Var(String),
    Index(String, usize),
    Call(String, Vec<Expr>),
    Gather(Vec<Expr>),
    Await(Box<Expr>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Stmt {
    Assign(String, Expr),
    Return(Expr),
    TryAwaitReturn {
        awaited: Expr,
        ok_return: Expr,
        except_return: Expr,
    },
    Expr(Expr),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Pending {
    AssignGather { var: String },
    ValueGather,
    TryAwaitReturn { ok_return: Expr, except_return: Expr },
    PlainAwait,
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    stmts: Vec<Stmt>,
    pc: usize,
    env: Env,
    last_value: serde_json::Value,
    pending: Pending,
}

/// A minimal reference implementation of [`InterpreterAdapter`] for tests.
pub struct ReferenceInterpreter;

impl Default for ReferenceInterpreter {
    fn default() -> Self {
        Self
    }
}

impl InterpreterAdapter for ReferenceInterpreter {
    fn start(
        &self,
        code: &str,
        _inputs: Option<&serde_json::Value>,
        allowed_functions: &[String],
    ) -> Result<Outcome, InterpreterError> {
        let stmts = parse(code).map_err(InterpreterError::UserCode)?;
        check_allowed(&stmts, allowed_functions)?;
        run(stmts, 0, Env::new(), serde_json::Value::Null)
    }

    fn resume(
        &self,
        state: &[u8],
        results: HashMap<i32, CallOutcome>,
    ) -> Result<Outcome, InterpreterError> {
        let snapshot: Snapshot = serde_json::from_slice(state)
            .map_err(|e| InterpreterError::SnapshotIncompatible(e.to_string()))?;
        apply_results(snapshot, results)
    }
}

fn check_allowed(stmts: &[Stmt], allowed: &[String]) -> Result<(), InterpreterError> {
    fn walk(expr: &Expr, allowed: &[String]) -> Result<(), InterpreterError> {
        match expr {
            Expr::Call(name, args) => {
                if !allowed.is_empty() && !allowed.iter().any(|f| f == name) {
                    return Err(InterpreterError::UserCode(format!(
                        "call to disallowed function '{name}'"
                    )));
                }
                for a in args {
                    walk(a, allowed)?;
                }
                Ok(())
            }
            Expr::Add(a, b) => {
                walk(a, allowed)?;
                walk(b, allowed)
            }
            Expr::Gather(items) => {
                for i in items {
                    walk(i, allowed)?;
                }
                Ok(())
            }
            Expr::Await(inner) => walk(inner, allowed),
            Expr::Int(_) | Expr::Str(_) | Expr::Var(_) | Expr::Index(_, _) => Ok(()),
        }
    }
    for stmt in stmts {
        match stmt {
            Stmt::Assign(_, e) | Stmt::Return(e) | Stmt::Expr(e) => walk(e, allowed)?,
            Stmt::TryAwaitReturn { awaited, .. } => walk(awaited, allowed)?,
        }
    }
    Ok(())
}

/// Evaluate an expression that contains no unresolved external calls.
fn eval_pure(expr: &Expr, env: &Env) -> Result<serde_json::Value, InterpreterError> {
    match expr {
        Expr::Int(n) => Ok(serde_json::json!(n)),
        Expr::Str(s) => Ok(serde_json::json!(s)),
        Expr::Add(a, b) => {
            let av = eval_pure(a, env)?;
            let bv = eval_pure(b, env)?;
            match (av.as_i64(), bv.as_i64()) {
                (Some(x), Some(y)) => Ok(serde_json::json!(x + y)),
                _ => Err(InterpreterError::UserCode("'+' requires two integers".into())),
            }
        }
        Expr::Var(name) => env
            .get(name)
            .cloned()
            .ok_or_else(|| InterpreterError::UserCode(format!("undefined variable '{name}'"))),
        Expr::Index(name, idx) => {
            let base = env
                .get(name)
                .ok_or_else(|| InterpreterError::UserCode(format!("undefined variable '{name}'")))?;
            base.get(idx)
                .cloned()
                .ok_or_else(|| InterpreterError::UserCode(format!("index {idx} out of range on '{name}'")))
        }
        Expr::Call(name, _) => Err(InterpreterError::UserCode(format!(
            "call to '{name}' used where a pure value was expected"
        ))),
        Expr::Gather(_) => Err(InterpreterError::UserCode(
            "gather used where a pure value was expected".into(),
        )),
        Expr::Await(_) => Err(InterpreterError::UserCode(
            "await used where a pure value was expected".into(),
        )),
    }
}

fn eval_call_args(call: &Expr, env: &Env) -> Result<PendingCallRequest, InterpreterError> {
    match call {
        Expr::Call(name, args) => {
            let values = args
                .iter()
                .map(|a| eval_pure(a, env))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(PendingCallRequest {
                call_id: 0,
                function_name: name.clone(),
                args: serde_json::Value::Array(values),
            })
        }
        _ => Err(InterpreterError::UserCode(
            "gather/await may only wrap a direct function call".into(),
        )),
    }
}

fn pending_calls_for(exprs: &[Expr], env: &Env) -> Result<Vec<PendingCallRequest>, InterpreterError> {
    exprs
        .iter()
        .enumerate()
        .map(|(i, e)| {
            let mut req = eval_call_args(e, env)?;
            req.call_id = i as i32;
            Ok(req)
        })
        .collect()
}

fn run(
    stmts: Vec<Stmt>,
    mut pc: usize,
    mut env: Env,
    mut last_value: serde_json::Value,
) -> Result<Outcome, InterpreterError> {
    loop {
        if pc >= stmts.len() {
            return Ok(Outcome::Complete(last_value));
        }
        let stmt = stmts[pc].clone();
        match stmt {
            Stmt::Assign(var, Expr::Gather(items)) => {
                let pending_calls = pending_calls_for(&items, &env)?;
                let state = serde_json::to_vec(&Snapshot {
                    stmts,
                    pc,
                    env,
                    last_value,
                    pending: Pending::AssignGather { var },
                })
                .expect("snapshot is always serializable");
                return Ok(Outcome::Suspended { state, pending_calls });
            }
            Stmt::Assign(var, expr) => {
                let v = eval_pure(&expr, &env)?;
                env.insert(var, v);
                pc += 1;
            }
            Stmt::Return(Expr::Gather(items)) => {
                let pending_calls = pending_calls_for(&items, &env)?;
                let state = serde_json::to_vec(&Snapshot {
                    stmts,
                    pc,
                    env,
                    last_value,
                    pending: Pending::ValueGather,
                })
                .expect("snapshot is always serializable");
                return Ok(Outcome::Suspended { state, pending_calls });
            }
            Stmt::Return(expr) => {
                return Ok(Outcome::Complete(eval_pure(&expr, &env)?));
            }
            Stmt::TryAwaitReturn {
                awaited,
                ok_return,
                except_return,
            } => {
                let req = eval_call_args(&awaited, &env)?;
                let state = serde_json::to_vec(&Snapshot {
                    stmts,
                    pc,
                    env,
                    last_value,
                    pending: Pending::TryAwaitReturn { ok_return, except_return },
                })
                .expect("snapshot is always serializable");
                return Ok(Outcome::Suspended {
                    state,
                    pending_calls: vec![req],
                });
            }
            Stmt::Expr(Expr::Gather(items)) => {
                let pending_calls = pending_calls_for(&items, &env)?;
                let state = serde_json::to_vec(&Snapshot {
                    stmts,
                    pc,
                    env,
                    last_value,
                    pending: Pending::ValueGather,
                })
                .expect("snapshot is always serializable");
                return Ok(Outcome::Suspended { state, pending_calls });
            }
            Stmt::Expr(Expr::Await(inner)) => {
                let req = eval_call_args(&inner, &env)?;
                let state = serde_json::to_vec(&Snapshot {
                    stmts,
                    pc,
                    env,
                    last_value,
                    pending: Pending::PlainAwait,
                })
                .expect("snapshot is always serializable");
                return Ok(Outcome::Suspended {
                    state,
                    pending_calls: vec![req],
                });
            }
            Stmt::Expr(expr) => {
                last_value = eval_pure(&expr, &env)?;
                pc += 1;
            }
        }
    }
}

fn apply_results(
    snapshot: Snapshot,
    results: HashMap<i32, CallOutcome>,
) -> Result<Outcome, InterpreterError> {
    let Snapshot {
        stmts,
        pc,
        mut env,
        last_value,
        pending,
    } = snapshot;

    let gathered = |results: &HashMap<i32, CallOutcome>| -> Result<serde_json::Value, InterpreterError> {
        let mut values = Vec::with_capacity(results.len());
        for i in 0..results.len() as i32 {
            match results.get(&i) {
                Some(CallOutcome::Completed(v)) => values.push(v.clone()),
                Some(CallOutcome::Failed(e)) => {
                    return Err(InterpreterError::UserCode(format!(
                        "unhandled call failure in gather: {e}"
                    )))
                }
                None => {
                    return Err(InterpreterError::UserCode(format!(
                        "missing result for call_id {i}"
                    )))
                }
            }
        }
        Ok(serde_json::Value::Array(values))
    };

    match pending {
        Pending::AssignGather { var } => {
            let value = gathered(&results)?;
            env.insert(var, value);
            run(stmts, pc + 1, env, last_value)
        }
        Pending::ValueGather => {
            let value = gathered(&results)?;
            if pc + 1 >= stmts.len() {
                Ok(Outcome::Complete(value))
            } else {
                run(stmts, pc + 1, env, value)
            }
        }
        Pending::TryAwaitReturn { ok_return, except_return } => {
            let outcome = results
                .get(&0)
                .ok_or_else(|| InterpreterError::UserCode("missing result for call_id 0".into()))?;
            match outcome {
                CallOutcome::Completed(_) => Ok(Outcome::Complete(eval_pure(&ok_return, &env)?)),
                CallOutcome::Failed(_) => Ok(Outcome::Complete(eval_pure(&except_return, &env)?)),
            }
        }
        Pending::PlainAwait => {
            let outcome = results
                .get(&0)
                .ok_or_else(|| InterpreterError::UserCode("missing result for call_id 0".into()))?;
            match outcome {
                CallOutcome::Failed(e) => Err(InterpreterError::UserCode(e.clone())),
                CallOutcome::Completed(v) => {
                    if pc + 1 >= stmts.len() {
                        Ok(Outcome::Complete(v.clone()))
                    } else {
                        run(stmts, pc + 1, env, v.clone())
                    }
                }
            }
        }
    }
}

// --- lexer/parser ---------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Int(i64),
    Str(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Semicolon,
    Equals,
    Plus,
    Colon,
}

fn lex(code: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = code.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            ';' => {
                tokens.push(Token::Semicolon);
                i += 1;
            }
            '=' => {
                tokens.push(Token::Equals);
                i += 1;
            }
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            ':' => {
                tokens.push(Token::Colon);
                i += 1;
            }
            '\'' | '"' => {
                let quote = c;
                i += 1;
                let start = i;
                while i < chars.len() && chars[i] != quote {
                    i += 1;
                }
                if i >= chars.len() {
                    return Err("unterminated string literal".into());
                }
                tokens.push(Token::Str(chars[start..i].iter().collect()));
                i += 1;
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                tokens.push(Token::Int(text.parse().map_err(|_| "bad integer literal")?));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => return Err(format!("unexpected character '{other}'")),
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn expect(&mut self, tok: &Token) -> Result<(), String> {
        match self.advance() {
            Some(t) if &t == tok => Ok(()),
            other => Err(format!("expected {tok:?}, found {other:?}")),
        }
    }

    fn expect_ident(&mut self, text: &str) -> Result<(), String> {
        match self.advance() {
            Some(Token::Ident(s)) if s == text => Ok(()),
            other => Err(format!("expected keyword '{text}', found {other:?}")),
        }
    }

    fn parse_program(&mut self) -> Result<Vec<Stmt>, String> {
        let mut stmts = Vec::new();
        while self.peek().is_some() {
            stmts.push(self.parse_stmt()?);
            if matches!(self.peek(), Some(Token::Semicolon)) {
                self.advance();
            } else {
                break;
            }
        }
        Ok(stmts)
    }

    fn parse_stmt(&mut self) -> Result<Stmt, String> {
        match self.peek() {
            Some(Token::Ident(s)) if s == "try" => self.parse_try_stmt(),
            Some(Token::Ident(s)) if s == "return" => {
                self.advance();
                Ok(Stmt::Return(self.parse_expr()?))
            }
            Some(Token::Ident(name)) if self.lookahead_is_assign(name) => {
                let name = name.clone();
                self.advance();
                self.expect(&Token::Equals)?;
                Ok(Stmt::Assign(name, self.parse_expr()?))
            }
            _ => Ok(Stmt::Expr(self.parse_expr()?)),
        }
    }

    fn lookahead_is_assign(&self, _name: &str) -> bool {
        matches!(self.tokens.get(self.pos + 1), Some(Token::Equals))
    }

    fn parse_try_stmt(&mut self) -> Result<Stmt, String> {
        self.expect_ident("try")?;
        self.expect(&Token::Colon)?;
        self.expect_ident("await")?;
        let awaited = self.parse_primary()?;
        self.expect(&Token::Semicolon)?;
        self.expect_ident("return")?;
        let ok_return = self.parse_expr()?;
        self.expect_ident("except")?;
        self.expect(&Token::Colon)?;
        self.expect_ident("return")?;
        let except_return = self.parse_expr()?;
        Ok(Stmt::TryAwaitReturn {
            awaited,
            ok_return,
            except_return,
        })
    }

    fn parse_expr(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_primary()?;
        while matches!(self.peek(), Some(Token::Plus)) {
            self.advance();
            let right = self.parse_primary()?;
            left = Expr::Add(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, String> {
        self.expect(&Token::LParen)?;
        let mut args = Vec::new();
        if !matches!(self.peek(), Some(Token::RParen)) {
            args.push(self.parse_expr()?);
            while matches!(self.peek(), Some(Token::Comma)) {
                self.advance();
                args.push(self.parse_expr()?);
            }
        }
        self.expect(&Token::RParen)?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expr, String> {
        match self.advance() {
            Some(Token::Int(n)) => Ok(Expr::Int(n)),
            Some(Token::Str(s)) => Ok(Expr::Str(s)),
            Some(Token::Ident(name)) if name == "gather" => Ok(Expr::Gather(self.parse_args()?)),
            Some(Token::Ident(name)) if name == "await" => Ok(Expr::Await(Box::new(self.parse_primary()?))),
            Some(Token::Ident(name)) => {
                if matches!(self.peek(), Some(Token::LParen)) {
                    Ok(Expr::Call(name, self.parse_args()?))
                } else if matches!(self.peek(), Some(Token::LBracket)) {
                    self.advance();
                    let idx = match self.advance() {
                        Some(Token::Int(n)) => n as usize,
                        other => return Err(format!("expected integer index, found {other:?}")),
                    };
                    self.expect(&Token::RBracket)?;
                    Ok(Expr::Index(name, idx))
                } else {
                    Ok(Expr::Var(name))
                }
            }
            other => Err(format!("unexpected token {other:?}")),
        }
    }
}

fn parse(code: &str) -> Result<Vec<Stmt>, String> {
    let tokens = lex(code)?;
    let mut parser = Parser { tokens, pos: 0 };
    let stmts = parser.parse_program()?;
    if parser.peek().is_some() {
        return Err(format!("trailing tokens starting at {:?}", parser.peek()));
    }
    Ok(stmts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(v: serde_json::Value) -> CallOutcome {
        CallOutcome::Completed(v)
    }

    #[test]
    fn immediate_completion() {
        let interp = ReferenceInterpreter;
        let outcome = interp.start("1 + 2", None, &[]).unwrap();
        assert!(matches!(outcome, Outcome::Complete(v) if v == serde_json::json!(3)));
    }

    #[test]
    fn single_batch_of_three_parallel_calls() {
        let interp = ReferenceInterpreter;
        let outcome = interp
            .start(
                "gather(process('a'), process('b'), process('c'))",
                None,
                &["process".to_string()],
            )
            .unwrap();
        let (state, pending) = match outcome {
            Outcome::Suspended { state, pending_calls } => (state, pending_calls),
            _ => panic!("expected suspension"),
        };
        assert_eq!(pending.len(), 3);

        let mut results = HashMap::new();
        results.insert(0, ok(serde_json::json!("p_a")));
        results.insert(1, ok(serde_json::json!("p_b")));
        results.insert(2, ok(serde_json::json!("p_c")));
        let outcome = interp.resume(&state, results).unwrap();
        assert!(
            matches!(outcome, Outcome::Complete(v) if v == serde_json::json!(["p_a", "p_b", "p_c"]))
        );
    }

    #[test]
    fn nested_gather_produces_two_batches() {
        let interp = ReferenceInterpreter;
        let code = "xs = gather(f(1), f(2), f(3)); ys = gather(g(xs[0]), g(xs[1]), g(xs[2])); ys";
        let outcome = interp
            .start(code, None, &["f".to_string(), "g".to_string()])
            .unwrap();
        let (state1, pending1) = match outcome {
            Outcome::Suspended { state, pending_calls } => (state, pending_calls),
            _ => panic!("expected suspension"),
        };
        assert_eq!(pending1.len(), 3);
        let mut r1 = HashMap::new();
        r1.insert(0, ok(serde_json::json!(2)));
        r1.insert(1, ok(serde_json::json!(3)));
        r1.insert(2, ok(serde_json::json!(4)));
        let outcome2 = interp.resume(&state1, r1).unwrap();
        let (state2, pending2) = match outcome2 {
            Outcome::Suspended { state, pending_calls } => (state, pending_calls),
            _ => panic!("expected second suspension"),
        };
        assert_eq!(pending2.len(), 3);
        let mut r2 = HashMap::new();
        r2.insert(0, ok(serde_json::json!(4)));
        r2.insert(1, ok(serde_json::json!(6)));
        r2.insert(2, ok(serde_json::json!(8)));
        let final_outcome = interp.resume(&state2, r2).unwrap();
        assert!(
            matches!(final_outcome, Outcome::Complete(v) if v == serde_json::json!([4, 6, 8]))
        );
    }

    #[test]
    fn call_failure_caught_by_try_except() {
        let interp = ReferenceInterpreter;
        let code = r#"try: await boom(); return "ok" except: return "caught""#;
        let outcome = interp.start(code, None, &["boom".to_string()]).unwrap();
        let state = match outcome {
            Outcome::Suspended { state, pending_calls } => {
                assert_eq!(pending_calls.len(), 1);
                state
            }
            _ => panic!("expected suspension"),
        };
        let mut results = HashMap::new();
        results.insert(0, CallOutcome::Failed("boom always fails".into()));
        let outcome = interp.resume(&state, results).unwrap();
        assert!(matches!(outcome, Outcome::Complete(v) if v == serde_json::json!("caught")));
    }

    #[test]
    fn unhandled_call_failure_propagates() {
        let interp = ReferenceInterpreter;
        let outcome = interp.start("await boom()", None, &["boom".to_string()]).unwrap();
        let state = match outcome {
            Outcome::Suspended { state, .. } => state,
            _ => panic!("expected suspension"),
        };
        let mut results = HashMap::new();
        results.insert(0, CallOutcome::Failed("boom always fails".into()));
        let err = interp.resume(&state, results).unwrap_err();
        assert!(matches!(err, InterpreterError::UserCode(_)));
    }

    #[test]
    fn disallowed_function_is_rejected_at_start() {
        let interp = ReferenceInterpreter;
        let err = interp.start("boom()", None, &["other".to_string()]).unwrap_err();
        assert!(matches!(err, InterpreterError::UserCode(_)));
    }
}
