/*!

This is the long-form manual for `vote_tally` and `votetally`.

## The tally

An election is made of *posts* (the positions to fill), *candidates* (each
running for exactly one post) and *ballots*. A ballot holds at most one
selection per post, and a voter may leave posts out.

For every post, the tally counts the ballots that select one of the
candidates of that post. A selection that names an unknown candidate, or a
candidate running for another post, is not counted. The leading candidate is
the one with the most votes; on a tie, the candidate registered first wins.
No candidate is leading while nobody has received a vote.

The results of a tie can be inspected with `PostResult::tied_leaders`.

## The store

`votetally` keeps the election in a single JSON file (by default
`election.json`, see `--store`). The file contains one array per collection,
using the field names of the document database the dashboard was built on:

```json
{
  "posts": [
    { "id": "post-00000001", "title": "President", "description": "",
      "createdAt": "2026-03-01T09:00:00Z" }
  ],
  "candidates": [
    { "id": "candidate-00000002", "postId": "post-00000001", "name": "Alice",
      "slogan": "Forward", "image": "https://...", "bio": "",
      "createdAt": 1772355600000 }
  ],
  "voters": [
    { "id": "voter-00000003", "name": "Bob", "studentCode": "S001",
      "passwordHash": "...", "voted": false,
      "createdAt": { "seconds": 1772355600, "nanoseconds": 0 } }
  ],
  "votes": [
    { "id": "vote-00000004", "voterId": "voter-00000003",
      "votes": { "post-00000001": "candidate-00000002" } }
  ],
  "nextId": 5
}
```

Timestamps may be RFC 3339 strings, milliseconds since the epoch, or
`{seconds, nanoseconds}` objects. Exports from the dashboard that still carry a
plaintext `password` field for voters are accepted; new voters only get a
salted digest.

Keys the program does not know about, at the top level or inside a document,
are kept when the store is written back.

A command holds a lock on `<store>.lock` while it runs: commands started at
the same time run one after the other.

Posts, candidates and voters are reported in creation order. Documents
without a timestamp come last.

## Commands

* `init` creates an empty store.
* `add-post`, `delete-post` manage posts. Deleting a post also deletes its
  candidates.
* `add-candidate`, `delete-candidate` manage candidates.
* `add-voter`, `delete-voter` manage voters. Student codes are unique.
* `vote` casts the ballot of a voter, identified by student code and password:
  `votetally vote --student-code S001 --password secret --select post-00000001=candidate-00000002`
* `reset-votes --yes` deletes all the ballots and marks every voter as not
  having voted.
* `list` prints the posts, candidates and voters.
* `results` prints the tally in JSON. With `--out`, the output is written to a
  file instead. With `--reference`, the output is compared to an earlier
  report and the command fails if they differ.
* `analytics` prints the analytics report: turnout, participation and margin
  per post, candidate rankings and insights.

Set `RUST_LOG=info` (or pass `--verbose`) to follow the tally in the logs.

*/
