//! N-gram and span-overlap scorers
//!
//! All scores are in [0, 1]. Tokens are Unicode word runs and single
//! punctuation characters, lowercased.

use std::collections::HashMap;

use regex::Regex;

use super::traits::ScorerResult;

/// Smoothing numerator used when BLEU finds no matching unigram
const BLEU_EPSILON: f64 = 0.1;

/// Compiled patterns shared by the lexical scorers
#[derive(Debug, Clone)]
pub struct Tokenizer {
    token: Regex,
    article: Regex,
    punctuation: Regex,
}

impl Tokenizer {
    pub fn new() -> ScorerResult<Self> {
        Ok(Self {
            token: Regex::new(r"\w+|[^\w\s]")?,
            article: Regex::new(r"\b(a|an|the)\b")?,
            punctuation: Regex::new(r"[^\w\s]")?,
        })
    }

    /// Lowercased word and punctuation tokens
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let lower = text.to_lowercase();
        self.token
            .find_iter(&lower)
            .map(|m| m.as_str().to_string())
            .collect()
    }

    /// Reading-comprehension answer normalization: lowercase, drop
    /// punctuation and English articles, collapse whitespace
    pub fn normalize_answer(&self, text: &str) -> String {
        let lower = text.to_lowercase();
        let no_punct = self.punctuation.replace_all(&lower, "");
        let no_articles = self.article.replace_all(&no_punct, " ");
        no_articles.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// 1.0 when both answers normalize to the same text
    pub fn exact_match(&self, reference: &str, hypothesis: &str) -> f64 {
        if self.normalize_answer(reference) == self.normalize_answer(hypothesis) {
            1.0
        } else {
            0.0
        }
    }

    /// Token-overlap F1 over normalized answers
    pub fn span_f1(&self, reference: &str, hypothesis: &str) -> f64 {
        let reference = self.normalize_answer(reference);
        let hypothesis = self.normalize_answer(hypothesis);
        let ref_tokens: Vec<&str> = reference.split_whitespace().collect();
        let hyp_tokens: Vec<&str> = hypothesis.split_whitespace().collect();

        if ref_tokens.is_empty() || hyp_tokens.is_empty() {
            return if ref_tokens == hyp_tokens { 1.0 } else { 0.0 };
        }

        let common = overlap(&counts(ref_tokens.iter().copied()), &counts(hyp_tokens.iter().copied()));
        if common == 0 {
            return 0.0;
        }
        let precision = common as f64 / hyp_tokens.len() as f64;
        let recall = common as f64 / ref_tokens.len() as f64;
        2.0 * precision * recall / (precision + recall)
    }

    /// ROUGE-N F-measure
    pub fn rouge_n(&self, reference: &str, hypothesis: &str, n: usize) -> f64 {
        let ref_tokens = self.tokenize(reference);
        let hyp_tokens = self.tokenize(hypothesis);
        let ref_grams = ngram_counts(&ref_tokens, n);
        let hyp_grams = ngram_counts(&hyp_tokens, n);

        let ref_total: usize = ref_grams.values().sum();
        let hyp_total: usize = hyp_grams.values().sum();
        if ref_total == 0 || hyp_total == 0 {
            return 0.0;
        }
        let common = overlap(&ref_grams, &hyp_grams);
        f_measure(common as f64 / hyp_total as f64, common as f64 / ref_total as f64)
    }

    /// ROUGE-L F-measure over the longest common token subsequence
    pub fn rouge_l(&self, reference: &str, hypothesis: &str) -> f64 {
        let ref_tokens = self.tokenize(reference);
        let hyp_tokens = self.tokenize(hypothesis);
        if ref_tokens.is_empty() || hyp_tokens.is_empty() {
            return 0.0;
        }
        let lcs = lcs_len(&ref_tokens, &hyp_tokens);
        f_measure(lcs as f64 / hyp_tokens.len() as f64, lcs as f64 / ref_tokens.len() as f64)
    }

    /// Sentence BLEU with unigram weight only
    pub fn bleu1(&self, reference: &str, hypothesis: &str) -> f64 {
        let ref_tokens = self.tokenize(reference);
        let hyp_tokens = self.tokenize(hypothesis);
        if hyp_tokens.is_empty() {
            return 0.0;
        }

        let matches = overlap(&ngram_counts(&ref_tokens, 1), &ngram_counts(&hyp_tokens, 1));
        let numerator = if matches == 0 { BLEU_EPSILON } else { matches as f64 };
        let precision = numerator / hyp_tokens.len() as f64;

        let c = hyp_tokens.len() as f64;
        let r = ref_tokens.len() as f64;
        let brevity_penalty = if c > r { 1.0 } else { (1.0 - r / c).exp() };
        brevity_penalty * precision
    }
}

fn f_measure(precision: f64, recall: f64) -> f64 {
    if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    }
}

fn counts<'a>(tokens: impl Iterator<Item = &'a str>) -> HashMap<Vec<&'a str>, usize> {
    let mut map = HashMap::new();
    for token in tokens {
        *map.entry(vec![token]).or_insert(0) += 1;
    }
    map
}

fn ngram_counts(tokens: &[String], n: usize) -> HashMap<Vec<&str>, usize> {
    let mut map = HashMap::new();
    if n == 0 || tokens.len() < n {
        return map;
    }
    for window in tokens.windows(n) {
        let gram: Vec<&str> = window.iter().map(String::as_str).collect();
        *map.entry(gram).or_insert(0) += 1;
    }
    map
}

/// Clipped overlap between two n-gram multisets
fn overlap<'a>(a: &HashMap<Vec<&'a str>, usize>, b: &HashMap<Vec<&'a str>, usize>) -> usize {
    a.iter()
        .map(|(gram, count)| b.get(gram).map_or(0, |other| (*count).min(*other)))
        .sum()
}

fn lcs_len(a: &[String], b: &[String]) -> usize {
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for x in a {
        for (j, y) in b.iter().enumerate() {
            curr[j + 1] = if x == y {
                prev[j] + 1
            } else {
                curr[j].max(prev[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}
