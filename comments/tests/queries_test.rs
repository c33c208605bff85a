extern crate timely;
extern crate rollup;
extern crate comments;

use std::cell::RefCell;
use std::rc::Rc;

use timely::dataflow::{InputHandle, ProbeHandle};
use timely::dataflow::operators::{Inspect, Probe};

use rollup::window::{DAY, HOUR, MONTH, WEEK};

use comments::event::{CommentInfo, CommentType};
use comments::models::{CommentHourlyCount, Top3Article};
use comments::queries::{comments_count, top_articles, QueryParams};

fn comment(id: u64, time: u64, article: &str) -> CommentInfo {
    CommentInfo {
        id: id.to_string(),
        create_date: time,
        comment_type: CommentType::Comment,
        article_id: article.to_string(),
        user_id: 1,
        user_display_name: String::new(),
        depth: 1,
        in_reply_to: 0,
        recommendations: 0,
        body_length: 10,
    }
}

fn post(id: u64, time: u64, article: &str) -> CommentInfo {
    CommentInfo { comment_type: CommentType::Post, ..comment(id, time, article) }
}

#[test]
fn counts_comments_per_bucket_and_hour() {
    timely::execute_directly(|worker| {
        let results = Rc::new(RefCell::new(Vec::new()));
        let sink = results.clone();
        let mut input = InputHandle::new();
        let mut probe = ProbeHandle::new();

        worker.dataflow(|scope| {
            comments_count::run(&input.to_stream(scope), HOUR, &QueryParams::default())
                .inspect(move |counts: &CommentHourlyCount| sink.borrow_mut().push(counts.clone()))
                .probe_with(&mut probe);
        });

        // 00:10, 00:40 and 01:05; the post at 00:20 is not a comment.
        let events = vec![
            comment(1, 10 * 60, "a"),
            post(2, 20 * 60, "a"),
            comment(3, 40 * 60, "a"),
            comment(4, 65 * 60, "b"),
        ];
        for event in events {
            input.advance_to(event.time());
            input.send(event);
        }
        input.advance_to(2 * HOUR);
        while probe.less_than(input.time()) { worker.step(); }

        assert_eq!(*results.borrow(), vec![
            CommentHourlyCount { timestamp: HOUR, counts: vec![(0, 2)] },
            CommentHourlyCount { timestamp: 2 * HOUR, counts: vec![(0, 1)] },
        ]);
    });
}

#[test]
fn buckets_follow_the_hour_of_day() {
    timely::execute_directly(|worker| {
        let results = Rc::new(RefCell::new(Vec::new()));
        let sink = results.clone();
        let mut input = InputHandle::new();

        worker.dataflow(|scope| {
            comments_count::run(&input.to_stream(scope), DAY, &QueryParams::default())
                .inspect(move |counts: &CommentHourlyCount| sink.borrow_mut().push(counts.clone()));
        });

        for (id, &time) in [HOUR, 3 * HOUR, 3 * HOUR + 1, 23 * HOUR].iter().enumerate() {
            input.advance_to(time);
            input.send(comment(id as u64, time, "a"));
        }
        input.close();
        while worker.step() { }

        assert_eq!(*results.borrow(), vec![
            CommentHourlyCount { timestamp: DAY, counts: vec![(0, 1), (1, 2), (11, 1)] },
        ]);
    });
}

#[test]
fn ranks_the_most_commented_articles() {
    timely::execute_directly(|worker| {
        let results = Rc::new(RefCell::new(Vec::new()));
        let sink = results.clone();
        let mut input = InputHandle::new();

        worker.dataflow(|scope| {
            top_articles::run(&input.to_stream(scope), HOUR, &QueryParams::default())
                .inspect(move |ranking: &Top3Article| sink.borrow_mut().push(ranking.clone()));
        });

        let mut time = 0;
        let mut id = 0;
        for &(article, comments) in &[("D", 1), ("C", 3), ("B", 5), ("A", 5)] {
            for _ in 0..comments {
                input.advance_to(time);
                input.send(comment(id, time, article));
                time += 30;
                id += 1;
            }
        }
        input.close();
        while worker.step() { }

        let results = results.borrow();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].timestamp, HOUR);
        assert_eq!(results[0].article_ids(), vec!["A", "B", "C"]);
        let scores: Vec<_> = results[0].articles.iter().map(|a| a.comments).collect();
        assert_eq!(scores, vec![5, 5, 3]);
    });
}

#[test]
fn ranking_length_is_configurable() {
    timely::execute_directly(|worker| {
        let results = Rc::new(RefCell::new(Vec::new()));
        let sink = results.clone();
        let mut input = InputHandle::new();
        let params = QueryParams { top_n: 1, ..QueryParams::default() };

        worker.dataflow(|scope| {
            top_articles::run(&input.to_stream(scope), HOUR, &params)
                .inspect(move |ranking: &Top3Article| sink.borrow_mut().push(ranking.clone()));
        });

        input.send(comment(1, 5, "x"));
        input.send(comment(2, 6, "y"));
        input.send(comment(3, 7, "y"));
        input.close();
        while worker.step() { }

        let results = results.borrow();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].article_ids(), vec!["y"]);
    });
}

#[test]
fn rolls_counts_up_to_weeks_and_months() {
    timely::execute_directly(|worker| {
        let results = Rc::new(RefCell::new(Vec::new()));
        let mut input = InputHandle::new();

        worker.dataflow(|scope| {
            let levels = comments_count::run_all(&input.to_stream(scope), &QueryParams::default()).expect("valid ladder");
            assert_eq!(levels.iter().map(|level| level.0).collect::<Vec<_>>(), vec![DAY, WEEK, MONTH]);
            for (length, counts) in levels {
                let sink = results.clone();
                counts.inspect(move |counts: &CommentHourlyCount| sink.borrow_mut().push((length, counts.clone())));
            }
        });

        let times = [HOUR, DAY + 3 * HOUR, DAY + 3 * HOUR + 5, 8 * DAY];
        for (id, &time) in times.iter().enumerate() {
            input.advance_to(time);
            input.send(comment(id as u64, time, "a"));
        }
        input.close();
        while worker.step() { }

        let mut results = results.borrow().clone();
        results.sort();
        let summary: Vec<_> = results.into_iter().map(|(length, counts)| (length, counts.timestamp, counts.counts)).collect();
        assert_eq!(summary, vec![
            (DAY, DAY, vec![(0, 1)]),
            (DAY, 2 * DAY, vec![(1, 2)]),
            (DAY, 9 * DAY, vec![(0, 1)]),
            (WEEK, WEEK, vec![(0, 1), (1, 2)]),
            (WEEK, 2 * WEEK, vec![(0, 1)]),
            (MONTH, MONTH, vec![(0, 2), (1, 2)]),
        ]);
    });
}

#[test]
fn ranks_each_rollup_level() {
    timely::execute_directly(|worker| {
        let results = Rc::new(RefCell::new(Vec::new()));
        let mut input = InputHandle::new();

        worker.dataflow(|scope| {
            for (length, rankings) in top_articles::run_all(&input.to_stream(scope), &QueryParams::default()).expect("valid ladder") {
                let sink = results.clone();
                rankings.inspect(move |ranking: &Top3Article| sink.borrow_mut().push((length, ranking.clone())));
            }
        });

        // "b" leads every day, but "a" collects more over the week.
        let mut id = 0;
        for day in 0..6 {
            let start = day * DAY;
            input.advance_to(start);
            for &article in &["b", "b", "a"] {
                input.send(comment(id, start, article));
                id += 1;
            }
        }
        input.advance_to(6 * DAY);
        for _ in 0..10 {
            input.send(comment(id, 6 * DAY, "a"));
            id += 1;
        }
        input.close();
        while worker.step() { }

        let results = results.borrow();
        let weekly: Vec<_> = results.iter().filter(|r| r.0 == WEEK).map(|r| r.1.article_ids()).collect();
        assert_eq!(weekly, vec![vec!["a", "b"]]);
        let first_day: Vec<_> = results.iter().filter(|r| r.0 == DAY && r.1.timestamp == DAY).map(|r| r.1.article_ids()).collect();
        assert_eq!(first_day, vec![vec!["b", "a"]]);
        let monthly: Vec<_> = results.iter().filter(|r| r.0 == MONTH).map(|r| (r.1.timestamp, r.1.articles[0].comments)).collect();
        assert_eq!(monthly, vec![(MONTH, 16)]);
    });
}
